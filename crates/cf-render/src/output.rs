use crate::dot::DotGenerator;
use crate::html::HtmlGenerator;
use anyhow::{Context, Result};
use cf_core::{Ruleset, Settings};
use cf_flow::FlowResolver;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files produced by one generation run.
#[derive(Debug, Default)]
pub struct GeneratedOutput {
    /// `<table>-<chain>` stems of the per-entry-chain graphs, in generation order
    pub entry_graphs: Vec<String>,
    /// Table names that got an overview graph
    pub table_graphs: Vec<String>,
    pub chain_pages: usize,
    pub dot_files: Vec<PathBuf>,
    pub index: PathBuf,
}

/// Lays generated files out under an existing output directory.
///
/// ```text
/// <root>/index.html
/// <root>/<table>.dot
/// <root>/<table>-<chain>.dot
/// <root>/<table>/<chain>.html
/// ```
pub struct OutputWriter {
    root: PathBuf,
    dot: DotGenerator,
    html: HtmlGenerator,
}

impl OutputWriter {
    /// The directory must already exist.
    pub fn new(root: &Path, settings: &Settings) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Output directory {} does not exist", root.display());
        }

        Ok(Self {
            root: root.to_path_buf(),
            dot: DotGenerator::new(&settings.render_format),
            html: HtmlGenerator::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_all(&self, ruleset: &Ruleset, settings: &Settings) -> Result<GeneratedOutput> {
        let mut output = GeneratedOutput {
            chain_pages: self.write_chain_pages(ruleset)?,
            ..Default::default()
        };

        for table in &ruleset.tables {
            let path = self.write_file(
                &format!("{}.dot", table.name),
                &self.dot.table_overview(table),
            )?;
            output.table_graphs.push(table.name.clone());
            output.dot_files.push(path);
        }

        for (stem, path) in self.write_entry_graphs(ruleset, settings)? {
            output.entry_graphs.push(stem);
            output.dot_files.push(path);
        }

        output.index = self.write_file(
            "index.html",
            &self.html.index_page(
                &output.entry_graphs,
                &output.table_graphs,
                &settings.render_format,
            ),
        )?;

        Ok(output)
    }

    /// One page per chain, under a directory per table.
    pub fn write_chain_pages(&self, ruleset: &Ruleset) -> Result<usize> {
        let mut written = 0;
        for table in &ruleset.tables {
            let dir = self.root.join(&table.name);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;

            for chain in &table.chains {
                self.write_file(
                    &format!("{}/{}.html", table.name, chain.name),
                    &self.html.chain_page(chain),
                )?;
                written += 1;
            }
        }
        info!("Wrote {} chain pages", written);
        Ok(written)
    }

    /// A flow graph for every configured entry chain, in every table that declares it.
    pub fn write_entry_graphs(
        &self,
        ruleset: &Ruleset,
        settings: &Settings,
    ) -> Result<Vec<(String, PathBuf)>> {
        let mut written = vec![];
        for chain in &settings.entry_chains {
            for table in &ruleset.tables {
                if table.chain(chain).is_none() {
                    continue;
                }

                let resolution = FlowResolver::new(table)
                    .with_policy_as_trailing_rule(settings.policy_as_trailing_rule)
                    .resolve(chain);
                debug!(
                    table = %table.name,
                    chain = %chain,
                    edges = resolution.edges.len(),
                    chains = resolution.visited.len(),
                    "resolved entry chain"
                );

                let stem = format!("{}-{}", table.name, chain);
                let path = self.write_file(
                    &format!("{}.dot", stem),
                    &self.dot.flow_graph(&table.name, chain, &resolution),
                )?;
                written.push((stem, path));
            }
        }
        Ok(written)
    }

    fn write_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}
