// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: ingestion, reclassification and merge against one
//! project.
//!
//! Each test creates an isolated TestHarness with temp SQLite, a mock
//! provider and real PDF fixtures. Tests are independent and order-insensitive.

use std::sync::Arc;

use serde_json::json;
use taxsort_agent::{ClassificationPipeline, JobPayload, Worker, WorkerStats};
use taxsort_classify::CategoryCatalog;
use taxsort_core::types::ProjectStatus;
use taxsort_core::{CategoryId, ProjectId};
use taxsort_merge::DocumentMergeCoordinator;
use taxsort_reclassify::{ReclassificationEngine, ReclassificationUpdate, reclassification_settings};
use taxsort_test_utils::TestHarness;

fn analysis(summary: &str) -> String {
    json!({"summary": summary, "keywords": [], "document_type": "document", "key_entities": {}})
        .to_string()
}

fn classification_reply() -> String {
    json!([
        {"id": 1, "file_name": "lohn.pdf", "category_id": 11, "confidence": 0.95, "reasoning": "wage statement"},
        {"id": 2, "file_name": "miete.pdf", "category_id": 19, "confidence": 0.6, "reasoning": "looks like housing"},
        {"id": 3, "file_name": "spende.pdf", "confidence": 0.2, "reasoning": "no idea"}
    ])
    .to_string()
}

async fn ingested_project(harness: &TestHarness) -> ProjectId {
    harness.write_header_pages().unwrap();
    let project = harness.storage.create_project("Familie Muster").await.unwrap();
    for (name, label) in [
        ("lohn.pdf", "Lohnsteuerbescheinigung"),
        ("miete.pdf", "Mietvertrag"),
        ("spende.pdf", "Zuwendungsbestaetigung"),
    ] {
        let path = harness.write_pdf_upload(name, &[label]).unwrap();
        harness
            .storage
            .add_file(project.id, &path.to_string_lossy())
            .await
            .unwrap();
    }

    let outcome = ClassificationPipeline::from_config(
        &harness.config,
        Arc::clone(&harness.storage),
        Arc::clone(&harness.memory),
        Arc::new(CategoryCatalog::builtin().unwrap()),
        harness.mock_provider.clone(),
    )
    .run(project.id)
    .await
    .unwrap();
    assert_eq!(outcome.documents_classified, 3);
    project.id
}

fn reclassifier(harness: &TestHarness) -> ReclassificationEngine {
    ReclassificationEngine::new(
        Arc::clone(&harness.storage),
        Arc::clone(&harness.memory),
        Arc::new(CategoryCatalog::builtin().unwrap()),
        harness.mock_provider.clone(),
        Arc::new(DocumentMergeCoordinator::from_config(&harness.config.merge)),
        reclassification_settings(&harness.config.llm),
    )
}

fn standard_responses() -> Vec<String> {
    vec![
        analysis("Annual wage statement"),
        analysis("Rental contract for a flat let to a tenant"),
        analysis("Donation receipt"),
        classification_reply(),
    ]
}

// ---- Ingestion ----

#[tokio::test]
async fn missing_category_is_coerced_to_unclassifiable() {
    let harness = TestHarness::builder()
        .with_mock_responses(standard_responses())
        .build()
        .await
        .unwrap();
    let project_id = ingested_project(&harness).await;

    let snapshot = harness.memory.get_project_results(project_id).await.unwrap();
    let ids: Vec<u8> = snapshot
        .classifications
        .iter()
        .map(|r| r.category_id.get())
        .collect();
    assert_eq!(ids, vec![11, 19, 20]);
    assert!(snapshot.merged_pdf_path.is_some());

    let project = harness.storage.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
}

// ---- Reclassification ----

#[tokio::test]
async fn instruction_moves_only_the_targeted_file() {
    let harness = TestHarness::builder()
        .with_mock_responses(standard_responses())
        .build()
        .await
        .unwrap();
    let project_id = ingested_project(&harness).await;
    let files = harness.storage.list_files(project_id).await.unwrap();
    let before = harness.memory.get_project_results(project_id).await.unwrap();

    harness
        .mock_provider
        .add_response(format!(
            "Sure! Here is the plan:\n```json\n{}\n```",
            json!({
                "understood_request": "The rental contract is rental income",
                "reclassifications": [{
                    "file_id": files[1].id,
                    "file_name": "miete.pdf",
                    "old_category_id": 19,
                    "new_category_id": 9,
                    "reasoning": "Flat is let to a tenant"
                }],
                "agent_notes": ""
            })
        ))
        .await;

    let result = reclassifier(&harness)
        .reclassify_with_prompt(project_id, "miete.pdf is rental income", true)
        .await;
    assert!(result.success, "{}", result.message);
    assert!(result.merged_pdf_regenerated);
    assert_ne!(result.merged_pdf_path, before.merged_pdf_path);

    let after = harness.memory.get_project_results(project_id).await.unwrap();
    for file in &files {
        let old = before.record_for_file(file.id).unwrap();
        let new = after.record_for_file(file.id).unwrap();
        if file.id == files[1].id {
            assert_eq!(new.category_id.get(), 9);
            assert!(new.reclassified);
        } else {
            assert_eq!(new.category_id, old.category_id);
            assert!(!new.reclassified);
        }
    }
}

#[tokio::test]
async fn reasoning_trail_is_append_only() {
    let harness = TestHarness::builder()
        .with_mock_responses(standard_responses())
        .build()
        .await
        .unwrap();
    let project_id = ingested_project(&harness).await;
    let donation = harness.storage.list_files(project_id).await.unwrap()[2].id;
    let engine = reclassifier(&harness);

    for (category, reason) in [(7, "special expenses"), (8, "actually extraordinary burdens")] {
        let update =
            ReclassificationUpdate::new(donation, CategoryId::new(category).unwrap()).with_reasoning(reason);
        assert!(engine.apply(project_id, &[update], false).await.success);
    }

    let file = harness
        .storage
        .get_file(project_id, donation)
        .await
        .unwrap()
        .unwrap();
    let trail = file.reasoning.unwrap();
    let first = trail.find("special expenses").unwrap();
    let second = trail.find("actually extraordinary burdens").unwrap();
    assert!(trail.starts_with("no idea"));
    assert!(first < second);
    assert_eq!(file.category_id.map(|c| c.get()), Some(8));
}

// ---- Merge ----

#[tokio::test]
async fn merge_counts_only_files_present_on_disk() {
    let harness = TestHarness::builder()
        .with_mock_responses(standard_responses())
        .build()
        .await
        .unwrap();
    let project_id = ingested_project(&harness).await;
    let files = harness.storage.list_files(project_id).await.unwrap();
    std::fs::remove_file(&files[0].file_path).unwrap();

    let merged = DocumentMergeCoordinator::from_config(&harness.config.merge)
        .merge(
            project_id,
            Some("Familie Muster"),
            files.iter().map(Into::into).collect(),
        )
        .await;
    assert!(merged.success);
    assert_eq!(merged.categories_included, 20);
    assert_eq!(merged.documents_merged, 2);
    assert_eq!(merged.category_counts.values().sum::<usize>(), 2);
    assert_eq!(merged.warnings.len(), 1);
    assert_eq!(merged.total_pages, 22);
}

// ---- Worker ----

#[tokio::test]
async fn worker_runs_queued_ingestion_and_updates() {
    let harness = TestHarness::builder()
        .with_mock_responses(standard_responses())
        .build()
        .await
        .unwrap();
    harness.write_header_pages().unwrap();
    let project = harness.storage.create_project("queued").await.unwrap();
    for (name, label) in [("lohn.pdf", "Lohn"), ("miete.pdf", "Miete"), ("spende.pdf", "Spende")] {
        let path = harness.write_pdf_upload(name, &[label]).unwrap();
        harness
            .storage
            .add_file(project.id, &path.to_string_lossy())
            .await
            .unwrap();
    }
    let queue = harness.config.worker.queue_name.clone();
    let classify = JobPayload::Classify { project_id: project.id };
    harness
        .storage
        .enqueue(&queue, &classify.to_json().unwrap())
        .await
        .unwrap();

    let worker = Worker::new(
        harness.config.clone(),
        Arc::clone(&harness.storage),
        harness.mock_provider.clone(),
        None,
        Arc::new(CategoryCatalog::builtin().unwrap()),
    );
    assert_eq!(worker.drain().await.unwrap(), WorkerStats { completed: 1, failed: 0 });

    let files = harness.storage.list_files(project.id).await.unwrap();
    let apply = JobPayload::Apply {
        project_id: project.id,
        updates: vec![ReclassificationUpdate::new(files[2].id, CategoryId::new(7).unwrap())],
        regenerate_pdf: true,
    };
    harness
        .storage
        .enqueue(&queue, &apply.to_json().unwrap())
        .await
        .unwrap();
    assert_eq!(worker.drain().await.unwrap(), WorkerStats { completed: 1, failed: 0 });

    let file = harness
        .storage
        .get_file(project.id, files[2].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.category_id.map(|c| c.get()), Some(7));
    assert!(file.reclassified);
    let project = harness.storage.get_project(project.id).await.unwrap().unwrap();
    assert!(project.merged_pdf_path.is_some());
}
