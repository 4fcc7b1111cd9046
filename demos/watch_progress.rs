//! Start a pack in the background and follow it from two subscribers.
//!
//! ```sh
//! cargo run --example watch_progress
//! ```

use futures::StreamExt;
use peelpack_gen::{
    CreateProjectRequest, FsStorage, GenConfig, MockProvider, MockProviderConfig, Orchestrator,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = GenConfig::builder().with_max_concurrent(4).build();
    let temp = std::env::temp_dir().join("peelpack-watch-progress");

    // Slow and flaky, so retries and partial failure show up
    let provider = MockProvider::new(
        MockProviderConfig::default()
            .with_delay(Duration::from_millis(300))
            .with_fail_rate(0.2),
    );
    let orch = Orchestrator::from_config(&config, FsStorage::new(&temp), provider)?;

    let request = CreateProjectRequest::text("a robot barista").with_style("pixel-art");
    let project_id = orch.create(request)?;
    println!("Created project {}", project_id);

    let progress_bar = orch.subscribe(&project_id);
    let mut log = orch.subscribe(&project_id);

    let bar = tokio::spawn(async move {
        let mut events = progress_bar;
        while let Some(event) = events.next().await {
            println!(
                "[{:>3.0}%] {}/{} {}",
                event.progress() * 100.0,
                event.completed_count,
                event.total_count,
                event.status.as_str()
            );
            if event.is_terminal() {
                break;
            }
        }
    });

    while let Some(event) = log.recv().await {
        if let Some(image) = &event.latest_image {
            println!(
                "  image {} -> {} (seed {}, retries {})",
                image.id,
                image.status.as_str(),
                image.seed,
                image.retry_count
            );
        }
        if event.is_terminal() {
            break;
        }
    }

    bar.await?;
    println!("Images written under {}", temp.display());
    Ok(())
}
