use std::path::Path;

use serde::ser;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_indicatif::indicatif_println;

use crate::AppResult;

/// Serialize a report or plan to pretty JSON and write it to the given
/// file, or print it to stdout when no path is configured.
#[tracing::instrument(name = "Saving output", level = "debug", skip(value))]
pub async fn write_json<S: ser::Serialize>(output: Option<&Path>, value: &S) -> AppResult<()> {
    let data = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            debug!("Writing report to {:?}", path);
            write_file(path, data).await
        }
        None => {
            indicatif_println!("{}", data);
            Ok(())
        }
    }
}

/// Write raw string data to a file, overwriting any existing content.
async fn write_file<P: AsRef<Path> + std::fmt::Debug>(output: P, data: String) -> AppResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
