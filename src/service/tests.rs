//! Service Module Tests
//!
//! ## Test Scopes
//! - **Upload/Download flow**: permission checks, ownership of shared directories,
//!   post-upload bookkeeping and reason codes.
//! - **Batch download**: grouping per node, request order, placeholders.
//! - **Deletes and path operations**: metadata finalization and owner-only checks.
//! - **Sharing**: grants only by owners, shared uploads stay with the directory owner.
//! - **Boundary**: timeouts, shutdown and leak-free error messages.

#[cfg(test)]
mod tests {
    use crate::config::OrchestratorConfig;
    use crate::executor::queue::TaskQueue;
    use crate::metadata::memory::InMemoryMetadata;
    use crate::metadata::types::{DirectoryId, FileId, UserId};
    use crate::service::files::FileService;
    use crate::service::permissions::RepositoryPermissions;
    use crate::service::types::{ERROR_TIMEOUT, FileDto, OperationResponse};
    use crate::test_support::*;

    use std::sync::Arc;
    use std::time::Duration;

    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);

    struct Harness {
        service: FileService,
        cluster: TestCluster,
        metadata: Arc<InMemoryMetadata>,
    }

    async fn harness(nodes: usize, replication: usize) -> Harness {
        harness_with(nodes, replication, OrchestratorConfig::default()).await
    }

    async fn harness_with(nodes: usize, replication: usize, config: OrchestratorConfig) -> Harness {
        let metadata = Arc::new(InMemoryMetadata::new());
        let cluster = cluster_on(metadata.clone(), nodes, 1_000_000, settings(replication)).await;
        let permissions = Arc::new(RepositoryPermissions::new(cluster.repository.clone()));
        let queue = TaskQueue::start(config.worker_count);
        let service = FileService::new(
            cluster.repository.clone(),
            permissions,
            cluster.selector.clone(),
            queue,
            &config,
        );

        Harness {
            service,
            cluster,
            metadata,
        }
    }

    async fn mkdir(harness: &Harness, path: &str, owner: UserId) -> DirectoryId {
        harness.service.create_directory(path, owner).await.unwrap()
    }

    fn code(response: &OperationResponse) -> &str {
        response.code().unwrap_or("")
    }

    // ============================================================
    // TEST 1: Upload and download
    // ============================================================

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        // ARRANGE
        let h = harness(3, 2).await;
        let dir = mkdir(&h, "docs", ALICE).await;

        // ACT
        let receipt = h
            .service
            .upload_file(dir, "notes.txt", b"remember".to_vec(), ALICE)
            .await
            .unwrap();
        let file = h.service.download_file(&receipt.file_id, ALICE).await.unwrap();

        // ASSERT
        assert_eq!(receipt.stored_on.len(), 2);
        assert_eq!(
            file,
            FileDto {
                name: "notes.txt".to_string(),
                content: b"remember".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn test_upload_books_usage_on_storing_nodes_only() {
        // ARRANGE: second node refuses
        let h = harness(2, 2).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        h.cluster.nodes[1].set_upload(Behavior::Reject);

        // ACT
        let receipt = h
            .service
            .upload_file(dir, "a.bin", vec![7; 500], ALICE)
            .await
            .unwrap();

        // ASSERT
        assert_eq!(receipt.stored_on, vec![h.cluster.node_ids[0]]);
        let stats = h.service.node_stats();
        assert_eq!(stats[0].space_used_bytes, 500);
        assert_eq!(stats[0].file_count, 1);
        assert_eq!(stats[1].space_used_bytes, 0);
        assert_eq!(stats.iter().map(|node| node.active_tasks).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_names_before_any_work() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;

        let empty = h.service.upload_file(dir, "  ", vec![1], ALICE).await;
        let slashed = h.service.upload_file(dir, "a/b", vec![1], ALICE).await;

        assert_eq!(code(&empty.unwrap_err()), "INVALID_INPUT");
        assert_eq!(code(&slashed.unwrap_err()), "INVALID_INPUT");
        assert_eq!(h.cluster.nodes[0].upload_calls(), 0);
        assert_eq!(h.service.queue_stats().enqueued, 1);
    }

    #[tokio::test]
    async fn test_upload_into_foreign_directory_needs_share() {
        // ARRANGE
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "shared", ALICE).await;

        // ACT: Bob before and after the share
        let denied = h.service.upload_file(dir, "b.txt", vec![1], BOB).await;
        assert!(h.service.share_directory_with_user("shared", ALICE, BOB).await.success);
        let receipt = h
            .service
            .upload_file(dir, "b.txt", vec![1], BOB)
            .await
            .unwrap();

        // ASSERT: the file belongs to the directory owner
        assert_eq!(code(&denied.unwrap_err()), "PERMISSION_DENIED");
        let stored = h
            .cluster
            .repository
            .find_file(&receipt.file_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.owner_id, ALICE);
        assert!(h.cluster.nodes[0].holds(&format!("{}-{}", ALICE, receipt.file_id)));
    }

    #[tokio::test]
    async fn test_upload_to_missing_directory_is_denied() {
        let h = harness(1, 1).await;

        let result = h
            .service
            .upload_file(DirectoryId(999), "a.txt", vec![1], ALICE)
            .await;

        assert_eq!(code(&result.unwrap_err()), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_total_upload_failure_hides_internal_text() {
        // ARRANGE
        let h = harness(2, 2).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        h.cluster.nodes[0].set_upload(Behavior::Error);
        h.cluster.nodes[1].set_upload(Behavior::Error);

        // ACT
        let response = h
            .service
            .upload_file(dir, "a.txt", vec![1], ALICE)
            .await
            .unwrap_err();

        // ASSERT
        assert!(!response.success);
        assert_eq!(code(&response), "UPLOAD_FAILED");
        assert!(!response.message.contains("scripted"));
    }

    #[tokio::test]
    async fn test_slow_upload_reports_timeout() {
        // ARRANGE
        let mut config = OrchestratorConfig::default();
        config.timeouts.upload_secs = 1;
        let h = harness_with(1, 1, config).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        h.cluster.nodes[0].set_upload(Behavior::Delay(Duration::from_secs(3)));

        // ACT
        let response = h
            .service
            .upload_file(dir, "slow.bin", vec![1], ALICE)
            .await
            .unwrap_err();

        // ASSERT
        assert_eq!(code(&response), ERROR_TIMEOUT);
    }

    #[tokio::test]
    async fn test_download_of_foreign_file_needs_share() {
        // ARRANGE
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        let receipt = h
            .service
            .upload_file(dir, "a.txt", b"secret".to_vec(), ALICE)
            .await
            .unwrap();

        // ACT
        let denied = h.service.download_file(&receipt.file_id, BOB).await;
        assert!(h.service.share_file_with_user("docs", "a.txt", ALICE, BOB).await.success);
        let shared = h.service.download_file(&receipt.file_id, BOB).await;

        // ASSERT
        assert_eq!(code(&denied.unwrap_err()), "NOT_FOUND");
        assert_eq!(shared.unwrap().content, b"secret".to_vec());
    }

    // ============================================================
    // TEST 2: Batch download
    // ============================================================

    #[tokio::test]
    async fn test_download_files_keeps_request_order_with_placeholders() {
        // ARRANGE: one node, so both files share one batch
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        let first = h
            .service
            .upload_file(dir, "one.txt", b"1".to_vec(), ALICE)
            .await
            .unwrap();
        let second = h
            .service
            .upload_file(dir, "two.txt", b"2".to_vec(), ALICE)
            .await
            .unwrap();
        let bobs_dir = mkdir(&h, "private", BOB).await;
        let foreign = h
            .service
            .upload_file(bobs_dir, "bob.txt", b"b".to_vec(), BOB)
            .await
            .unwrap();

        let request = vec![
            second.file_id.clone(),
            FileId::new(),
            first.file_id.clone(),
            foreign.file_id.clone(),
        ];

        // ACT
        let files = h.service.download_files(&request, ALICE).await;

        // ASSERT
        let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
        assert_eq!(names, vec!["two.txt", "ERROR", "one.txt", "ERROR"]);
        assert_eq!(files[0].content, b"2".to_vec());
        assert!(files[1].content.is_empty());
        assert_eq!(h.cluster.nodes[0].download_calls(), 1);
    }

    #[tokio::test]
    async fn test_download_files_failed_batch_yields_placeholders() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        let receipt = h
            .service
            .upload_file(dir, "one.txt", b"1".to_vec(), ALICE)
            .await
            .unwrap();
        h.cluster.nodes[0].set_download(Behavior::Error);

        let files = h.service.download_files(&[receipt.file_id], ALICE).await;

        assert_eq!(files, vec![FileDto::placeholder()]);
    }

    // ============================================================
    // TEST 3: Deletes
    // ============================================================

    #[tokio::test]
    async fn test_delete_file_by_path_removes_content_and_metadata() {
        // ARRANGE
        let h = harness(2, 2).await;
        mkdir(&h, "docs/2024", ALICE).await;
        let dir = mkdir(&h, "docs/2024", ALICE).await;
        let receipt = h
            .service
            .upload_file(dir, "a.txt", vec![0; 100], ALICE)
            .await
            .unwrap();

        // ACT
        let response = h
            .service
            .delete_file_by_path("docs/2024", "a.txt", ALICE)
            .await;

        // ASSERT
        assert!(response.success, "{:?}", response);
        assert!(
            h.cluster
                .repository
                .find_file(&receipt.file_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.cluster.nodes.iter().all(|node| node.stored_keys().is_empty()));
        assert!(h.service.node_stats().iter().all(|node| node.space_used_bytes == 0));
    }

    #[tokio::test]
    async fn test_delete_file_total_failure_keeps_metadata() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        let receipt = h
            .service
            .upload_file(dir, "a.txt", vec![1], ALICE)
            .await
            .unwrap();
        h.cluster.nodes[0].set_delete(Behavior::Error);

        let response = h.service.delete_file_by_path("docs", "a.txt", ALICE).await;

        assert_eq!(code(&response), "DELETE_FAILED");
        assert!(
            h.cluster
                .repository
                .find_file(&receipt.file_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_delete_file_by_unknown_path_is_not_found() {
        let h = harness(1, 1).await;
        mkdir(&h, "docs", ALICE).await;

        let response = h.service.delete_file_by_path("docs", "ghost.txt", ALICE).await;

        assert_eq!(code(&response), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_directory_returns_cleaned_count() {
        // ARRANGE
        let h = harness(2, 2).await;
        let root = mkdir(&h, "projects", ALICE).await;
        let nested = mkdir(&h, "projects/rust", ALICE).await;
        h.service
            .upload_file(root, "a.txt", vec![1], ALICE)
            .await
            .unwrap();
        h.service
            .upload_file(nested, "b.txt", vec![2], ALICE)
            .await
            .unwrap();

        // ACT
        let cleaned = h.service.delete_directory_by_id(root, ALICE).await.unwrap();

        // ASSERT
        assert_eq!(cleaned, 2);
        assert_eq!(h.metadata.file_count(), 0);
        assert_eq!(h.metadata.directory_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_directory_is_owner_only() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        assert!(h.service.share_directory_with_user("docs", ALICE, BOB).await.success);

        let by_bob = h.service.delete_directory_by_id(dir, BOB).await;
        let missing = h.service.delete_directory_by_id(DirectoryId(404), ALICE).await;

        assert_eq!(code(&by_bob.unwrap_err()), "PERMISSION_DENIED");
        assert_eq!(code(&missing.unwrap_err()), "NOT_FOUND");
        assert_eq!(h.metadata.directory_count(), 1);
    }

    // ============================================================
    // TEST 4: Rename and move
    // ============================================================

    #[tokio::test]
    async fn test_rename_and_move_by_path() {
        // ARRANGE
        let h = harness(1, 1).await;
        let inbox = mkdir(&h, "inbox", ALICE).await;
        mkdir(&h, "archive", ALICE).await;
        let receipt = h
            .service
            .upload_file(inbox, "draft.txt", vec![1], ALICE)
            .await
            .unwrap();

        // ACT
        let renamed = h
            .service
            .rename_file_by_path("inbox", "draft.txt", "final.txt", ALICE)
            .await;
        let moved = h
            .service
            .move_file_by_path("inbox", "final.txt", "archive", ALICE)
            .await;

        // ASSERT
        assert!(renamed.success);
        assert!(moved.success);
        let found = h
            .cluster
            .repository
            .find_file_by_path(ALICE, "archive", "final.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, receipt.file_id);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_is_rejected() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        h.service.upload_file(dir, "a.txt", vec![1], ALICE).await.unwrap();
        h.service.upload_file(dir, "b.txt", vec![2], ALICE).await.unwrap();

        let response = h
            .service
            .rename_file_by_path("docs", "a.txt", "b.txt", ALICE)
            .await;
        let missing_destination = h
            .service
            .move_file_by_path("docs", "a.txt", "nowhere", ALICE)
            .await;

        assert_eq!(code(&response), "INVALID_INPUT");
        assert_eq!(code(&missing_destination), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_rename_and_move_directory_by_path() {
        // ARRANGE
        let h = harness(1, 1).await;
        let drafts = mkdir(&h, "drafts", ALICE).await;
        mkdir(&h, "archive", ALICE).await;
        h.service
            .upload_file(drafts, "a.txt", vec![1], ALICE)
            .await
            .unwrap();

        // ACT
        let renamed = h
            .service
            .rename_directory_by_path("drafts", "2024", ALICE)
            .await;
        let moved = h
            .service
            .move_directory_by_path("2024", "archive", ALICE)
            .await;

        // ASSERT
        assert!(renamed.success);
        assert!(moved.success);
        let found = h
            .cluster
            .repository
            .find_file_by_path(ALICE, "archive/2024", "a.txt")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_directory_moves_reject_cycles_and_foreign_paths() {
        let h = harness(1, 1).await;
        mkdir(&h, "a/b", ALICE).await;
        mkdir(&h, "c", ALICE).await;
        mkdir(&h, "c", BOB).await;

        let into_child = h.service.move_directory_by_path("a", "a/b", ALICE).await;
        let clash = h.service.rename_directory_by_path("a", "c", ALICE).await;
        let by_bob = h.service.move_directory_by_path("a", "c", BOB).await;
        let slashed = h.service.rename_directory_by_path("a", "x/y", ALICE).await;

        assert_eq!(code(&into_child), "INVALID_INPUT");
        assert_eq!(code(&clash), "INVALID_INPUT");
        // Bob's paths resolve only in his own tree.
        assert_eq!(code(&by_bob), "NOT_FOUND");
        assert_eq!(code(&slashed), "INVALID_INPUT");
    }

    // ============================================================
    // TEST 5: Sharing
    // ============================================================

    #[tokio::test]
    async fn test_sharing_requires_an_owned_target() {
        // ARRANGE
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;
        h.service.upload_file(dir, "a.txt", vec![1], ALICE).await.unwrap();

        // ACT
        let to_self = h.service.share_directory_with_user("docs", ALICE, ALICE).await;
        let by_bob = h.service.share_file_with_user("docs", "a.txt", BOB, UserId(3)).await;
        let missing = h.service.share_file_with_user("docs", "zz.txt", ALICE, BOB).await;
        let granted = h.service.share_directory_with_user("docs", ALICE, BOB).await;

        // ASSERT
        assert_eq!(code(&to_self), "INVALID_INPUT");
        assert_eq!(code(&by_bob), "NOT_FOUND");
        assert_eq!(code(&missing), "NOT_FOUND");
        assert!(granted.success);
        let receipt = h.service.upload_file(dir, "b.txt", vec![2], BOB).await.unwrap();
        // Files written into a shared directory belong to its owner.
        let by_owner = h.service.download_file(&receipt.file_id, ALICE).await;
        assert_eq!(by_owner.unwrap().content, vec![2]);
    }

    // ============================================================
    // TEST 6: Boundary
    // ============================================================

    #[tokio::test]
    async fn test_requests_after_shutdown_report_queue_closed() {
        let h = harness(1, 1).await;
        let dir = mkdir(&h, "docs", ALICE).await;

        assert!(h.service.shutdown(Some(Duration::from_secs(1))).await);
        let response = h
            .service
            .upload_file(dir, "late.txt", vec![1], ALICE)
            .await
            .unwrap_err();

        assert_eq!(code(&response), "QUEUE_CLOSED");
        assert_eq!(
            h.service
                .node_stats()
                .iter()
                .map(|node| node.active_tasks)
                .sum::<usize>(),
            0
        );
    }

    #[test]
    fn test_success_response_omits_error_code() {
        let json = serde_json::to_value(OperationResponse::success("ok")).unwrap();

        assert_eq!(json, serde_json::json!({"success": true, "message": "ok"}));
    }

    #[tokio::test]
    async fn test_create_directory_rejects_empty_path() {
        let h = harness(1, 1).await;

        let response = h.service.create_directory(" / ", ALICE).await.unwrap_err();

        assert_eq!(code(&response), "INVALID_INPUT");
    }
}
