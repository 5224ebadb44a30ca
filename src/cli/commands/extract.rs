//! Extract command.

use std::path::Path;

use console::style;

use docflow::config::Settings;

use crate::cli::helpers::{build_extractor, read_document, status_label};

/// Print the normalized text of one document.
pub async fn cmd_extract(
    settings: &Settings,
    file: &Path,
    scan_images: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (filename, content) = read_document(file).await?;
    let extractor = build_extractor(settings)?;

    let extraction = extractor.process(&filename, &content, scan_images).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
        return Ok(());
    }

    println!("{}", extraction.text);

    eprintln!(
        "{} {}: {} ({} unit(s))",
        style("→").cyan(),
        filename,
        status_label(&extraction.status),
        extraction.units
    );
    if let docflow::extract::ExtractionStatus::Failed { ref cause } = extraction.status {
        eprintln!("  {} {}", style("✗").red(), cause);
    }
    for diagnostic in &extraction.diagnostics {
        let location = match (diagnostic.unit, diagnostic.image) {
            (Some(unit), Some(image)) => format!("unit {} image {}", unit, image),
            (Some(unit), None) => format!("unit {}", unit),
            _ => "document".to_string(),
        };
        eprintln!(
            "  {} {}: {}",
            style("!").yellow(),
            location,
            style(&diagnostic.cause).dim()
        );
    }

    Ok(())
}
