use anyhow::{Context, Result};
use clap::Parser;
use image_insight::config::Config;
use image_insight::image::ImageInput;
use image_insight::models::{AnalysisReport, ProviderId};
use image_insight::Orchestrator;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-insight")]
#[command(about = "Analyse an image with several AI vision and moderation services")]
struct CliArgs {
    /// Image file path or http(s) URL.
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Comma-separated providers to query.
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_provider_arg,
        default_value = "gemini,sightengine,clarifai"
    )]
    providers: Vec<ProviderId>,

    /// Print single-line JSON.
    #[arg(long)]
    compact: bool,
}

fn parse_provider_arg(input: &str) -> std::result::Result<ProviderId, String> {
    input.parse()
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn load_file(path: &Path) -> Result<ImageInput> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ImageInput::sniffed(bytes).with_context(|| format!("{} is not a supported image", path.display()))
}

fn render(report: &AnalysisReport, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(report)?
    } else {
        serde_json::to_string_pretty(report)?
    };
    Ok(json)
}

async fn run(args: CliArgs) -> Result<AnalysisReport> {
    let config = Config::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let selected: BTreeSet<ProviderId> = args.providers.into_iter().collect();

    let report = if is_url(&args.source) {
        orchestrator.analyze_url(&args.source, &selected).await?
    } else {
        let image = load_file(Path::new(&args.source))?;
        orchestrator.report(&image, &selected).await?
    };
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_insight=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let compact = args.compact;
    info!("Analysing {}", args.source);

    match run(args).await {
        Ok(report) => {
            info!(
                succeeded = ?report.succeeded(),
                failed = ?report.failed(),
                "Analysis finished"
            );
            println!("{}", render(&report, compact)?);
            Ok(())
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_providers_match_ui_selection() {
        let args = CliArgs::try_parse_from(["image-insight", "cat.png"]).unwrap();
        assert_eq!(
            args.providers,
            vec![ProviderId::Gemini, ProviderId::Sightengine, ProviderId::Clarifai]
        );
        assert!(!args.compact);
    }

    #[test]
    fn test_providers_flag_parses_list() {
        let args = CliArgs::try_parse_from([
            "image-insight",
            "--providers",
            "hf,Sightengine",
            "--compact",
            "https://example.com/a.jpg",
        ])
        .unwrap();
        assert_eq!(args.providers, vec![ProviderId::HuggingFace, ProviderId::Sightengine]);
        assert!(args.compact);
        assert!(is_url(&args.source));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = CliArgs::try_parse_from(["image-insight", "--providers", "openai", "x.png"])
            .unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_load_file_sniffs_type() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00])
            .unwrap();

        let image = load_file(file.path()).unwrap();
        assert_eq!(image.mime().as_str(), "image/png");
    }

    #[test]
    fn test_load_file_rejects_non_images() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"just some text").unwrap();

        let err = load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("not a supported image"));
        assert!(load_file(Path::new("/definitely/missing.png")).is_err());
    }
}
