//! Generate a full sixteen-image pack and wait for it to finish.
//!
//! Uses Gemini when `NANO_BANANA_API_KEY` and `NANO_BANANA_BASE_URL` are set,
//! otherwise the offline mock provider. Storage and database locations come
//! from `STORAGE_PATH` and `DB_PATH`.
//!
//! ```sh
//! cargo run --example generate_pack -- "a cute cat girl" anime
//! ```

use peelpack_gen::{
    logging, CreateProjectRequest, FsStorage, GeminiConfig, GeminiProvider, GenConfig,
    ImageProvider, MockProvider, Orchestrator, Project,
};

async fn run<P: ImageProvider>(
    config: &GenConfig,
    provider: P,
    request: CreateProjectRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = FsStorage::new(&config.storage_path);
    let orch = Orchestrator::from_config(config, storage, provider)?;

    let project: Project = orch.run_to_completion(request).await?;
    println!("Project {} finished: {}", project.id, project.status.as_str());

    for image in orch.images(&project.id)? {
        let label = match (image.emotion_type, image.surprise_index) {
            (Some(emotion), _) => emotion.as_str().to_string(),
            (_, Some(index)) => format!("surprise #{}", index),
            _ => "?".to_string(),
        };
        match image.error_message {
            Some(err) => println!("  {:<12} failed: {}", label, err),
            None => println!("  {:<12} {}", label, image.file_path),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = GenConfig::from_env()?;
    logging::init(&config.log_level);

    let mut args = std::env::args().skip(1);
    let description = args
        .next()
        .unwrap_or_else(|| "a cute cat girl with a red scarf".to_string());
    let mut request = CreateProjectRequest::text(description);
    if let Some(style) = args.next() {
        request = request.with_style(style);
    }

    match GeminiConfig::from_env() {
        Ok(gemini) => {
            println!("Using Gemini model {}", gemini.model);
            run(&config, GeminiProvider::new(gemini), request).await
        }
        Err(e) => {
            println!("{} - falling back to the mock provider", e);
            run(&config, MockProvider::default(), request).await
        }
    }
}
