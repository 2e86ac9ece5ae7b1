//! Fetch generated strategy and backtest files to a local directory.

use crate::engine::client::JobApi;
use crate::error::JobError;
use crate::model::{ArtifactKind, JobResult, ResultOutcome};
use std::path::{Path, PathBuf};

/// Reject server-supplied names that could escape the target directory.
pub fn validate_filename(name: &str) -> Result<&str, JobError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(JobError::InvalidFilename(name.to_string()));
    }
    Ok(name)
}

pub async fn download_artifact(
    api: &dyn JobApi,
    kind: ArtifactKind,
    filename: &str,
    dir: &Path,
) -> Result<PathBuf, JobError> {
    let filename = validate_filename(filename)?;
    let body = api.download(kind, filename).await?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, &body).await?;
    tracing::info!(kind = ?kind, path = %path.display(), bytes = body.len(), "artifact saved");
    Ok(path)
}

/// Every downloadable file named by a successful result.
pub fn artifacts(results: &[JobResult]) -> Vec<(ArtifactKind, String)> {
    let mut out = Vec::new();
    for r in results {
        if let ResultOutcome::Success {
            strategy_file,
            backtest_file,
            ..
        } = r.outcome()
        {
            if let Some(f) = strategy_file {
                out.push((ArtifactKind::Strategy, f.to_string()));
            }
            if let Some(f) = backtest_file {
                out.push((ArtifactKind::Backtest, f.to_string()));
            }
        }
    }
    out
}

/// Download every artifact, one at a time. A failed file does not stop the rest.
pub async fn download_all(
    api: &dyn JobApi,
    results: &[JobResult],
    dir: &Path,
) -> Vec<(String, Result<PathBuf, JobError>)> {
    let mut out = Vec::new();
    for (kind, filename) in artifacts(results) {
        let res = download_artifact(api, kind, &filename, dir).await;
        if let Err(e) = &res {
            tracing::warn!(file = %filename, error = %e, "artifact download failed");
        }
        out.push((filename, res));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{ok_result, ScriptedApi};
    use crate::model::ResultStatus;

    #[test]
    fn filenames_with_paths_are_rejected() {
        for bad in ["", "  ", ".", "..", "../etc/passwd", "a/b.py", "a\\b.py"] {
            assert!(
                matches!(validate_filename(bad), Err(JobError::InvalidFilename(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(validate_filename("strategy_1.py").unwrap(), "strategy_1.py");
        assert_eq!(validate_filename("..hidden.py").unwrap(), "..hidden.py");
    }

    #[test]
    fn only_successful_results_have_artifacts() {
        let mut failed = ok_result(2);
        failed.status = ResultStatus::Error;
        let list = artifacts(&[ok_result(1), failed]);
        assert_eq!(
            list,
            vec![
                (ArtifactKind::Strategy, "s1.py".to_string()),
                (ArtifactKind::Backtest, "b1.py".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn downloads_land_in_target_dir() {
        let api = ScriptedApi::with_polls(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let saved = download_all(&api, &[ok_result(1)], dir.path()).await;
        assert_eq!(saved.len(), 2);
        let strategy = std::fs::read_to_string(dir.path().join("s1.py")).unwrap();
        assert_eq!(strategy, "strategy:s1.py");
    }

    #[tokio::test]
    async fn unsafe_name_is_not_fetched() {
        let api = ScriptedApi::with_polls(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let res = download_artifact(&api, ArtifactKind::Strategy, "../x.py", dir.path()).await;
        assert!(matches!(res, Err(JobError::InvalidFilename(_))));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
