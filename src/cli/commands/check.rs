//! Check command: report which collaborators are usable.

use console::style;

use docflow::config::{Config, Settings};
use docflow::llm::LlmClient;
use docflow::ocr::{create_backend, OcrBackendType};

/// Report OCR backend and LLM availability.
pub async fn cmd_check(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => println!("{} Config: {}", style("→").cyan(), path.display()),
        None => println!("{} Config: {}", style("→").cyan(), style("defaults").dim()),
    }
    println!(
        "{} Data directory: {}",
        style("→").cyan(),
        settings.data_dir.display()
    );

    println!("\n{}", style("OCR Backends:").cyan());
    let mut configured_ok = false;
    for backend_type in [OcrBackendType::Tesseract, OcrBackendType::Ocrs] {
        let marker = if backend_type == settings.ocr_backend {
            style("*").green()
        } else {
            style(" ").dim()
        };
        match create_backend(backend_type, settings.ocr.clone()) {
            Ok(backend) if backend.is_available() => {
                if backend_type == settings.ocr_backend {
                    configured_ok = true;
                }
                println!(
                    "{} {:<12} {}",
                    marker,
                    backend_type.as_str(),
                    style("✓ available").green()
                );
            }
            Ok(backend) => {
                println!(
                    "{} {:<12} {}",
                    marker,
                    backend_type.as_str(),
                    style("○ not installed").yellow()
                );
                println!("                 {}", style(backend.availability_hint()).dim());
            }
            Err(e) => {
                println!(
                    "{} {:<12} {}",
                    marker,
                    backend_type.as_str(),
                    style(e.to_string()).dim()
                );
            }
        }
    }
    println!(
        "  OCR concurrency {}, per-image timeout {}s",
        settings.ocr_concurrency,
        settings.ocr.timeout.as_secs()
    );

    println!("\n{}", style("Topic Extraction:").cyan());
    let llm = LlmClient::new(settings.llm.clone())?;
    let llm_ok = llm.is_available().await;
    if !settings.llm.enabled {
        println!("  {}", style("disabled in config").dim());
    } else if llm_ok {
        println!(
            "  {} {} at {}",
            style("✓").green(),
            settings.llm.model,
            settings.llm.endpoint
        );
    } else {
        println!(
            "  {} not reachable at {}",
            style("✗").red(),
            settings.llm.endpoint
        );
    }

    println!();
    if configured_ok && (llm_ok || !settings.llm.enabled) {
        println!("{} Ready", style("✓").green());
    } else {
        println!(
            "{} Some collaborators are unavailable; extraction without OCR still works",
            style("!").yellow()
        );
    }

    Ok(())
}
