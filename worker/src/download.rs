use crossbuild_common::errors::*;
use crossbuild_common::http;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

pub fn filename_from_url(url: &Url) -> Result<String> {
    let filename = url
        .path_segments()
        .ok_or_else(|| format_err!("Url doesn't seem to have a path"))?
        .next_back()
        .ok_or_else(|| format_err!("Failed to get filename from path"))?
        .to_owned();
    if filename.is_empty() {
        bail!("Filename detected from url is empty");
    }
    Ok(filename)
}

/// Download `url_str` into `dir`, named after the last path segment of the url.
pub async fn download(url_str: &str, dir: &Path) -> Result<PathBuf> {
    let url = url_str
        .parse::<Url>()
        .context("Failed to parse input as url")?;
    let target = dir.join(filename_from_url(&url)?);

    info!("Downloading {:?} to {:?}", url_str, target);
    let client = http::client()?;
    let mut stream = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes_stream();

    let mut f = File::create(&target)
        .await
        .context("Failed to create output file")?;

    let mut bytes = 0;
    while let Some(item) = stream.next().await {
        let item = item?;
        f.write_all(&item).await?;
        bytes += item.len();
    }
    f.flush().await?;
    info!("Downloaded {} bytes", bytes);

    Ok(target)
}
