//! Persistence - file export for harvested catalogs
//!
//! `save` dispatches on the output path's extension to the matching writer.
//! An unsupported extension is a reported error, never a panic. The writers
//! are synchronous and run on the blocking pool.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, XlsxError};
use tokio::task;
use tracing::info;

use crate::domain::Product;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Unsupported file format '{0}'. Use json, csv, or xlsx.")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX serialization failed: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("writer task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Saves the records to the file named by `path`, picking the writer from
/// the extension.
pub async fn save(products: &[Product], path: &Path) -> Result<(), SaveError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let products = products.to_vec();
    let path: PathBuf = path.to_path_buf();

    match extension.as_str() {
        "json" => task::spawn_blocking(move || write_json(&products, &path)).await?,
        "csv" => task::spawn_blocking(move || write_csv(&products, &path)).await?,
        "xlsx" => task::spawn_blocking(move || write_xlsx(&products, &path)).await?,
        other => Err(SaveError::UnsupportedFormat(other.to_string())),
    }
}

fn write_json(products: &[Product], path: &Path) -> Result<(), SaveError> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, products)?;
    info!("Saved {} products to {}", products.len(), path.display());
    Ok(())
}

fn write_csv(products: &[Product], path: &Path) -> Result<(), SaveError> {
    let mut writer = csv::Writer::from_path(path)?;
    for product in products {
        writer.serialize(product)?;
    }
    writer.flush()?;
    info!("Saved {} products to {}", products.len(), path.display());
    Ok(())
}

fn write_xlsx(products: &[Product], path: &Path) -> Result<(), SaveError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    let headers = ["id", "name", "link", "regular_price", "promo_price", "brand"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for (row, product) in products.iter().enumerate() {
        let row = row as u32 + 1;
        worksheet.write_number(row, 0, product.id as f64)?;
        worksheet.write_string(row, 1, &product.name)?;
        worksheet.write_string(row, 2, &product.link)?;
        worksheet.write_number(row, 3, product.regular_price as f64)?;
        worksheet.write_number(row, 4, product.promo_price as f64)?;
        worksheet.write_string(row, 5, &product.brand)?;
    }

    workbook.save(path)?;
    info!("Saved {} products to {}", products.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Product> {
        vec![
            Product {
                id: 1,
                name: "Dry food".to_string(),
                link: "/p/1".to_string(),
                regular_price: 1500,
                promo_price: 1200,
                brand: "Royal".to_string(),
            },
            Product::new(2, "Leash".to_string(), "/p/2".to_string(), None),
        ]
    }

    #[tokio::test]
    async fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = save(&sample(), &dir.path().join("out.parquet")).await;
        assert!(matches!(result, Err(SaveError::UnsupportedFormat(ext)) if ext == "parquet"));
    }

    #[tokio::test]
    async fn missing_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = save(&sample(), &dir.path().join("out")).await;
        assert!(matches!(result, Err(SaveError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn json_roundtrip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        save(&sample(), &path).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let restored: Vec<Product> = serde_json::from_str(&contents).unwrap();
        assert_eq!(restored, sample());
    }

    #[tokio::test]
    async fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        save(&sample(), &path).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("regular_price"));
        assert!(lines[1].starts_with('1'));
    }

    #[tokio::test]
    async fn xlsx_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        save(&sample(), &path).await.unwrap();

        assert!(path.metadata().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn extension_dispatch_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.JSON");
        save(&sample(), &path).await.unwrap();
        assert!(path.exists());
    }
}
