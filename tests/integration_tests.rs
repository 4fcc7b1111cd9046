mod test_helpers;

use peelpack_gen::types::RETRY_SEED_OFFSET;
use peelpack_gen::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use test_helpers::*;

const BASE: i64 = 4242;

#[tokio::test]
async fn test_all_succeed_first_try() {
    let (orch, temp) = setup(ScriptedProvider::new());
    let id = orch
        .create(CreateProjectRequest::text("a cute cat girl").with_seed(BASE))
        .unwrap();
    let mut sub = orch.subscribe(&id);

    let events = drain_until_terminal(&mut sub).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, ProjectStatus::Completed);
    assert_eq!(last.completed_count, 16);
    assert_eq!(last.total_count, 16);

    let images = orch.images(&id).unwrap();
    assert!(images.iter().all(|i| i.status == ImageStatus::Success));
    assert!(images.iter().all(|i| i.retry_count == 0));
    for image in &images {
        assert!(temp.path().join(&image.file_path).exists());
    }
    assert_eq!(
        orch.project(&id).unwrap().unwrap().status,
        ProjectStatus::Completed
    );
}

#[tokio::test]
async fn test_one_failure_recovered_by_retry() {
    // Only the first emotion's original seed fails
    let (orch, _temp) = setup(ScriptedProvider::failing_on([BASE]));
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a fox knight").with_seed(BASE))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::Completed);
    let images = orch.images(&project.id).unwrap();
    let first = &images[0];
    assert_eq!(first.emotion_type, Some(Emotion::Happy));
    assert_eq!(first.status, ImageStatus::Success);
    assert_eq!(first.retry_count, 1);
    assert_eq!(first.seed, BASE + 1000);
    assert!(images[1..].iter().all(|i| i.retry_count == 0));
}

#[tokio::test]
async fn test_retry_failure_gives_partial_failed() {
    let (orch, _temp) = setup(ScriptedProvider::failing_on([BASE, BASE + 1000]));
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a fox knight").with_seed(BASE))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::PartialFailed);
    let images = orch.images(&project.id).unwrap();
    let failed: Vec<&Image> = images
        .iter()
        .filter(|i| i.status == ImageStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 1);
    assert!(failed[0].error_message.as_deref().unwrap().contains("429"));
    assert_eq!(
        images
            .iter()
            .filter(|i| i.status == ImageStatus::Success)
            .count(),
        15
    );
}

#[tokio::test]
async fn test_every_image_failing_is_still_partial_failed() {
    let seeds = (0..16).flat_map(|i| {
        let s = if i < 9 { BASE + i } else { BASE + 2000 + (i - 9) };
        [s, s + RETRY_SEED_OFFSET]
    });
    let (orch, _temp) = setup(ScriptedProvider::failing_on(seeds));
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot").with_seed(BASE))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::PartialFailed);
    let images = orch.images(&project.id).unwrap();
    assert!(images.iter().all(|i| i.status == ImageStatus::Failed));
}

#[tokio::test]
async fn test_two_subscribers_see_identical_sequences() {
    let (orch, _temp) = setup(ScriptedProvider::failing_on([BASE + 3]));
    let id = orch
        .create(CreateProjectRequest::text("a robot").with_seed(BASE))
        .unwrap();
    let mut a = orch.subscribe(&id);
    let mut b = orch.subscribe(&id);

    let seen_a = drain_until_terminal(&mut a).await;
    let seen_b = drain_until_terminal(&mut b).await;
    assert_eq!(seen_a, seen_b);

    let first = &seen_a[0];
    assert_eq!(first.status, ProjectStatus::Generating);
    assert_eq!(first.completed_count, 0);
    // Start and finish per image, plus the opening and closing snapshots
    assert_eq!(seen_a.len(), 2 + 16 * 2);
}

#[tokio::test]
async fn test_completed_count_never_decreases() {
    let (orch, _temp) = setup(ScriptedProvider::failing_on([BASE + 1, BASE + 2001]));
    let id = orch
        .create(CreateProjectRequest::text("a robot").with_seed(BASE))
        .unwrap();
    let mut sub = orch.subscribe(&id);

    let events = drain_until_terminal(&mut sub).await;
    for pair in events.windows(2) {
        assert!(pair[1].completed_count >= pair[0].completed_count);
    }
    assert_eq!(events.last().unwrap().completed_count, 16);

    // Both failures were recovered, so every image reports one success snapshot
    let latest: Vec<&Image> = events.iter().filter_map(|e| e.latest_image.as_ref()).collect();
    assert_eq!(latest.len(), 16);
    assert!(latest.iter().all(|i| i.status == ImageStatus::Success));
}

#[tokio::test]
async fn test_failed_image_not_reported_as_latest() {
    let (orch, _temp) = setup(ScriptedProvider::failing_on([BASE, BASE + 1000]));
    let id = orch
        .create(CreateProjectRequest::text("a robot").with_seed(BASE))
        .unwrap();
    let mut sub = orch.subscribe(&id);

    let events = drain_until_terminal(&mut sub).await;
    let latest: Vec<&Image> = events.iter().filter_map(|e| e.latest_image.as_ref()).collect();
    assert_eq!(latest.len(), 15);
    assert!(latest.iter().all(|i| i.status == ImageStatus::Success));

    let failed_id = orch
        .images(&id)
        .unwrap()
        .into_iter()
        .find(|i| i.status == ImageStatus::Failed)
        .unwrap()
        .id;
    assert!(latest.iter().all(|i| i.id != failed_id));
    assert_eq!(events.last().unwrap().completed_count, 16);
}

#[tokio::test]
async fn test_seed_near_overflow_rejected_synchronously() {
    let (orch, _temp) = setup(ScriptedProvider::new());

    let result = orch.create(CreateProjectRequest::text("x").with_seed(i64::MAX - 5));
    assert!(matches!(result, Err(GenError::InvalidRequest(_))));
    assert!(orch.projects().unwrap().is_empty());

    let id = orch
        .create(CreateProjectRequest::text("x").with_seed(types::MAX_SEED_BASE))
        .unwrap();
    let mut sub = orch.subscribe(&id);
    let events = drain_until_terminal(&mut sub).await;
    assert_eq!(events.last().unwrap().status, ProjectStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_create_returns_before_any_image_finishes() {
    let (orch, _temp) = setup(ScriptedProvider::new().with_delay(Duration::from_secs(5)));

    let started = Instant::now();
    let id = orch.create(CreateProjectRequest::text("a robot")).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let images = orch.images(&id).unwrap();
    assert_eq!(images.len(), 16);
    assert!(images.iter().all(|i| !i.status.is_terminal()));

    let mut sub = orch.subscribe(&id);
    let events = drain_until_terminal(&mut sub).await;
    assert_eq!(events.last().unwrap().status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_sixteen_images_with_expected_seeds() {
    let provider = ScriptedProvider::new();
    let (orch, _temp) = setup(provider);
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot").with_seed(BASE))
        .await
        .unwrap();
    let images = orch.images(&project.id).unwrap();
    assert_eq!(images.len(), 16);

    let emotions: Vec<Emotion> = images[..9].iter().map(|i| i.emotion_type.unwrap()).collect();
    assert_eq!(emotions, Emotion::ALL.to_vec());
    for (i, image) in images[..9].iter().enumerate() {
        assert_eq!(image.category, ImageCategory::Emotion);
        assert_eq!(image.seed, BASE + i as i64);
    }

    let indices: HashSet<u8> = images[9..].iter().map(|i| i.surprise_index.unwrap()).collect();
    assert_eq!(indices, (0..7).collect());
    for image in &images[9..] {
        assert_eq!(image.category, ImageCategory::Surprise);
        assert_eq!(image.seed, BASE + 2000 + image.surprise_index.unwrap() as i64);
    }

    let seeds: HashSet<i64> = images.iter().map(|i| i.seed).collect();
    assert_eq!(seeds.len(), 16);
}

#[tokio::test]
async fn test_storage_failure_fails_image_after_retry() {
    let config = GenConfig::default();
    let orch =
        Orchestrator::from_config(&config, BrokenStorage, ScriptedProvider::new()).unwrap();
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot").with_seed(BASE))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::PartialFailed);
    let images = orch.images(&project.id).unwrap();
    for image in &images {
        assert_eq!(image.status, ImageStatus::Failed);
        assert_eq!(image.retry_count, 1);
        assert!(image.error_message.as_deref().unwrap().contains("disk full"));
    }
}

#[tokio::test]
async fn test_invalid_image_input_rejected_synchronously() {
    let (orch, _temp) = setup(ScriptedProvider::new());
    let request = CreateProjectRequest {
        input_kind: InputKind::Image,
        input_content: "not a json payload".into(),
        style_id: None,
        custom_prompt: None,
        seed: None,
    };

    let result = orch.create(request);
    assert!(matches!(result, Err(GenError::InvalidRequest(_))));
    assert!(orch.projects().unwrap().is_empty());

    let result = orch.create(image_request(InputKind::Mixed, None));
    assert!(matches!(result, Err(GenError::InvalidRequest(_))));
    assert!(orch.projects().unwrap().is_empty());
}

#[tokio::test]
async fn test_reference_image_sent_with_every_call() {
    let provider = Arc::new(ScriptedProvider::new());
    let (orch, _temp) = setup(SharedProvider(provider.clone()));
    let project = orch
        .run_to_completion(image_request(InputKind::Mixed, Some("a fox knight")))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(project.input_kind, InputKind::Mixed);
    let images = orch.images(&project.id).unwrap();
    assert!(images.iter().all(|i| i.prompt.starts_with("a fox knight, ")));

    let references = provider.references();
    assert_eq!(references.len(), 16);
    assert!(references.iter().all(|&r| r));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_is_respected() {
    let config = GenConfig::builder().with_max_concurrent(3).build();
    let temp = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(100)));
    let orch = Orchestrator::from_config(
        &config,
        FsStorage::new(temp.path()),
        SharedProvider(provider.clone()),
    )
    .unwrap();

    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot"))
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(provider.seeds().len(), 16);
    assert!(provider.max_in_flight() <= 3);
    assert!(provider.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_persisted_to_database_file() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("gen.db");
    let config = GenConfig::builder().with_db_path(db_path.clone()).build();
    let orch = Orchestrator::from_config(
        &config,
        FsStorage::new(temp.path().join("files")),
        MockProvider::default(),
    )
    .unwrap();

    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot"))
        .await
        .unwrap();
    drop(orch);

    let db = Database::open(Some(&db_path)).unwrap();
    let reloaded = db.get_project(&project.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ProjectStatus::Completed);
    let images = db.images_by_project(&project.id).unwrap();
    assert_eq!(images.len(), 16);
    assert!(images.iter().all(|i| i.model_metadata.is_some()));
}

#[tokio::test]
async fn test_late_subscriber_gets_no_history() {
    let (orch, _temp) = setup(ScriptedProvider::new());
    let project = orch
        .run_to_completion(CreateProjectRequest::text("a robot"))
        .await
        .unwrap();

    let mut late = orch.subscribe(&project.id);
    assert!(late.try_recv().is_none());

    let snapshot = orch.snapshot(&project.id).unwrap();
    assert_eq!(snapshot.completed_count, 16);
    assert!(snapshot.is_terminal());
}

#[test]
fn test_channel_torn_down_after_last_subscriber() {
    let pubsub: PubSub<ProgressEvent> = PubSub::new(4);
    let a = pubsub.subscribe(&channel_name("p"));
    let b = pubsub.subscribe(&channel_name("p"));
    assert_eq!(pubsub.channel_count(), 1);
    drop(a);
    assert_eq!(pubsub.channel_count(), 1);
    drop(b);
    assert_eq!(pubsub.channel_count(), 0);
}

/// Lets a test keep a handle on the provider the orchestrator owns.
struct SharedProvider(Arc<ScriptedProvider>);

impl ImageProvider for SharedProvider {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        self.0.generate(req).await
    }
}
