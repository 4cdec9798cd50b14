use futures::future::join_all;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{binary} failed on {path:?}: {stderr}")]
    Failed {
        binary: String,
        path: PathBuf,
        stderr: String,
    },
}

/// Outcome of rendering a batch of DOT files.
#[derive(Debug, Default)]
pub struct RenderSummary {
    pub rendered: Vec<PathBuf>,
    pub failures: Vec<RenderError>,
}

impl RenderSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the external Graphviz `dot` tool.
pub struct GraphvizRenderer {
    binary: String,
    format: String,
}

impl GraphvizRenderer {
    pub fn new(binary: &str, format: &str) -> Self {
        Self {
            binary: binary.to_string(),
            format: format.to_string(),
        }
    }

    /// Path the rendered image of `dot_file` is written to.
    pub fn output_path(&self, dot_file: &Path) -> PathBuf {
        dot_file.with_extension(&self.format)
    }

    /// `dot -T <format> -o <output> <input>`
    pub async fn render(&self, dot_file: &Path) -> Result<PathBuf, RenderError> {
        let output_file = self.output_path(dot_file);

        let output = Command::new(&self.binary)
            .arg("-T")
            .arg(&self.format)
            .arg("-o")
            .arg(&output_file)
            .arg(dot_file)
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                binary: self.binary.clone(),
                path: dot_file.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output_file)
    }

    /// Render every file concurrently. Failures are logged and collected, never fatal.
    pub async fn render_all(&self, dot_files: &[PathBuf]) -> RenderSummary {
        let results = join_all(dot_files.iter().map(|path| self.render(path))).await;

        let mut summary = RenderSummary::default();
        for result in results {
            match result {
                Ok(path) => {
                    info!("Rendered {}", path.display());
                    summary.rendered.push(path);
                }
                Err(e) => {
                    warn!("{}", e);
                    summary.failures.push(e);
                }
            }
        }
        summary
    }
}

impl Default for GraphvizRenderer {
    fn default() -> Self {
        Self::new("dot", "svg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_swaps_extension() {
        let renderer = GraphvizRenderer::new("dot", "png");
        assert_eq!(
            renderer.output_path(Path::new("/tmp/out/filter-INPUT.dot")),
            PathBuf::from("/tmp/out/filter-INPUT.png")
        );
    }

    #[tokio::test]
    async fn missing_binary_is_collected_not_fatal() {
        let renderer = GraphvizRenderer::new("chainflow-no-such-dot-binary", "svg");
        let files = vec![PathBuf::from("a.dot"), PathBuf::from("b.dot")];

        let summary = renderer.render_all(&files).await;
        assert!(!summary.is_clean());
        assert!(summary.rendered.is_empty());
        assert_eq!(summary.failures.len(), 2);
        assert!(matches!(summary.failures[0], RenderError::Spawn { .. }));
    }

    #[tokio::test]
    async fn empty_batch_is_clean() {
        let summary = GraphvizRenderer::default().render_all(&[]).await;
        assert!(summary.is_clean());
    }
}
