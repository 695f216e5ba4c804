use std::path::Path;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::Result;

// replaced through a rename, readers never see a half-written file
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path).await?;
    Ok(serde_json::from_slice(&content)?)
}
