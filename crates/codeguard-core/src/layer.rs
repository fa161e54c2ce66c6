use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::LayersConfig;
use crate::types::ArchLayer;

/// Result of resolving a namespace referenced by a `using` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerResolution {
    Layer(ArchLayer),
    /// Framework or third-party code; not part of the policy.
    External,
    Unknown,
}

/// Classifies namespaces and file paths into architectural layers using glob
/// patterns.
pub struct LayerClassifier {
    layers: Vec<(ArchLayer, GlobSet)>,
    external: Vec<String>,
}

fn build_globset(layer: ArchLayer, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid {layer} layer pattern '{pattern}'"))?;
        builder.add(glob);
    }
    builder
        .build()
        .with_context(|| format!("failed to compile {layer} layer patterns"))
}

impl LayerClassifier {
    /// Fails on the first pattern that is not a valid glob.
    pub fn new(config: &LayersConfig) -> Result<Self> {
        let layers = [
            (ArchLayer::Domain, &config.domain),
            (ArchLayer::Application, &config.application),
            (ArchLayer::Infrastructure, &config.infrastructure),
            (ArchLayer::Presentation, &config.presentation),
        ]
        .into_iter()
        .map(|(layer, patterns)| -> Result<(ArchLayer, GlobSet)> {
            Ok((layer, build_globset(layer, patterns)?))
        })
        .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            external: config.external.clone(),
        })
    }

    /// Classify a namespace such as `Inventory.Infrastructure.Persistence`.
    /// Prefixes are tried shortest first, so the leftmost layer-named segment
    /// decides: `Inventory.Infrastructure.Models` is Infrastructure.
    pub fn classify_namespace(&self, namespace: &str) -> Option<ArchLayer> {
        let segments: Vec<&str> = namespace
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        self.classify_segments(&segments)
    }

    /// Classify a `/`-separated path relative to the scan root by its
    /// directories.
    pub fn classify_path(&self, path: &str) -> Option<ArchLayer> {
        let normalized = path.replace('\\', "/");
        let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();
        self.classify_segments(&segments)
    }

    /// Resolve a referenced namespace against the layer policy.
    pub fn resolve_import(&self, namespace: &str) -> LayerResolution {
        if self.is_external(namespace) {
            return LayerResolution::External;
        }
        match self.classify_namespace(namespace) {
            Some(layer) => LayerResolution::Layer(layer),
            None => LayerResolution::Unknown,
        }
    }

    pub fn is_external(&self, namespace: &str) -> bool {
        self.external.iter().any(|prefix| {
            namespace == prefix
                || namespace
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    fn classify_segments(&self, segments: &[&str]) -> Option<ArchLayer> {
        for end in 1..=segments.len() {
            let candidate = segments[..end].join("/");
            for (layer, globs) in &self.layers {
                if globs.is_match(&candidate) {
                    return Some(*layer);
                }
            }
        }
        None
    }
}
