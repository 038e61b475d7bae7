//! Loading predictive models from artifact files.
//!
//! An artifact is a serialized [`ModelSpec`], JSON by default or TOML when
//! the file ends in `.toml`.

use crate::error::{IoError, Result};
use ephswarm_core::model::{ModelSpec, PredictiveModel};
use std::path::Path;
use std::sync::Arc;

pub fn parse_model(content: &str) -> Result<ModelSpec> {
    Ok(serde_json::from_str(content)?)
}

/// Reads a model artifact and instantiates it.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Arc<dyn PredictiveModel>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::not_found(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let spec = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(IoError::from),
        _ => parse_model(&content),
    }
    .map_err(|e| e.with_context(format!("loading model {}", path.display())))?;

    let model = spec.build();
    tracing::info!(path = %path.display(), model = model.name(), "Predictive model loaded");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephswarm_core::model::AdvectionModel;

    #[test]
    fn test_parse_advection_artifact() {
        let spec = parse_model(r#"{"kind": "advection", "horizon": 2.0, "gain": 3.0}"#).unwrap();
        assert_eq!(
            spec,
            ModelSpec::Advection(AdvectionModel {
                horizon: 2.0,
                gain: 3.0
            })
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(matches!(parse_model(r#"{"kind": "vae"}"#), Err(IoError::Json(_))));
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let err = load_model("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, IoError::NotFound(_)));
    }

    #[test]
    fn test_load_toml_artifact() {
        let path = std::env::temp_dir().join(format!("ephswarm-{}-model.toml", std::process::id()));
        std::fs::write(&path, "kind = \"null\"\n").unwrap();
        let model = load_model(&path).unwrap();
        assert!(model.is_null());
        std::fs::remove_file(path).ok();
    }
}
