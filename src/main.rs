//! Command-line driver
//!
//! Resolves the city and category names to their ids, submits one pipeline
//! run, waits on the bounded chain timeout and dispatches persistence once
//! the chain resolves.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use fourpaws_harvester::catalog::{resolve, HttpCatalogApi};
use fourpaws_harvester::infrastructure::config::AppConfig;
use fourpaws_harvester::infrastructure::http_client::HttpClient;
use fourpaws_harvester::infrastructure::logging;
use fourpaws_harvester::pipeline::PipelineOrchestrator;
use fourpaws_harvester::PipelineRequest;

/// Pet store catalog harvester.
#[derive(Debug, Parser)]
#[command(name = "fourpaws-harvester", version, about)]
struct Cli {
    /// Name of the product category. No case matching.
    category: String,

    /// Name of the city. No case matching.
    city: String,

    /// Minimum available number of products in the category.
    min_goods: u64,

    /// Output filename (json, csv, or xlsx format).
    filename: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;

    info!(
        "Fetching products for category '{}', city '{}' and minimum goods {}...",
        cli.category, cli.city, cli.min_goods
    );

    let http = HttpClient::new(&config.http, config.api.default_headers()?)
        .context("Failed to create HTTP client")?;
    let api = Arc::new(HttpCatalogApi::new(http, config.api.clone()));

    let Some(city_id) = resolve::fetch_city_id(api.as_ref(), &cli.city).await else {
        bail!("City '{}' not found", cli.city);
    };
    let Some(category_id) = resolve::fetch_category_id(api.as_ref(), &cli.category, &city_id).await
    else {
        bail!("Category '{}' not found", cli.category);
    };

    let orchestrator = PipelineOrchestrator::new(api, config.pipeline.clone()).await;
    let request = PipelineRequest::new(category_id, city_id, cli.min_goods);

    let products = orchestrator
        .run(&request)
        .await
        .context("An error occurred while fetching products")?;

    if products.is_empty() {
        warn!("No products were found or processed.");
        return Ok(());
    }

    info!("Fetched {} products.", products.len());

    orchestrator
        .save(request.request_id, products, &cli.filename)
        .await
        .context("An error occurred while saving products")?;

    info!("Products saved successfully in '{}'.", cli.filename.display());
    Ok(())
}
