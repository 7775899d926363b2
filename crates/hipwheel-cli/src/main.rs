//! hipwheel - build PyTorch-family wheels against the local ROCm toolkit
//!
//! ```text
//! hipwheel [OPTIONS] <SOURCE_DIR> [PYTHON] [GPU_ARCH] [PROJECTS]...
//! ```
//!
//! With no projects, `SOURCE_DIR` is built directly. Otherwise `SOURCE_DIR`
//! is a workspace and each project is cloned (or refreshed), patched and
//! built in the order given.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hipwheel_build::{
    init_tracing, ArtifactQuery, BuildPipeline, BuildReport, BuildRequest, SubProject, TracingSink,
};
use hipwheel_toolkit::{DefineTable, ResolverConfig, ToolkitResolver, VersionSelection};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "hipwheel")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build ROCm wheels for PyTorch, torchvision and torchaudio", long_about = None)]
struct Cli {
    /// Source tree to build, or workspace holding the projects
    source_dir: PathBuf,

    /// Python interpreter used for pip and setup.py
    #[arg(default_value = "python3")]
    python: String,

    /// GPU target architecture
    #[arg(default_value = "gfx1102")]
    gpu_arch: String,

    /// Projects to prepare and build in order (pytorch, vision, audio)
    projects: Vec<SubProject>,

    /// ROCm installation root
    #[arg(long, env = "ROCM_PATH", default_value = hipwheel_toolkit::DEFAULT_ROCM_PATH)]
    rocm_path: PathBuf,

    /// Program queried with `--showversion`
    #[arg(long, default_value = "rocm-smi")]
    diagnostic_tool: String,

    /// Pick the numerically highest sibling installation instead of the
    /// lexicographically last
    #[arg(long)]
    semantic_versions: bool,

    /// JSON file describing version-derived defines
    #[arg(long, value_name = "JSON")]
    define_table: Option<PathBuf>,

    /// Directory holding `<project>.patch` files
    #[arg(long)]
    patch_dir: Option<PathBuf>,

    /// Suffix identifying build artifacts in `dist/`
    #[arg(long, default_value = ".whl")]
    artifact_suffix: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Write the build report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn resolver_config(&self) -> ResolverConfig {
        let selection = if self.semantic_versions {
            VersionSelection::Semantic
        } else {
            VersionSelection::Lexicographic
        };
        ResolverConfig::default()
            .with_default_path(&self.rocm_path)
            .with_diagnostic_tool(&self.diagnostic_tool)
            .with_selection(selection)
    }

    fn build_request(&self) -> Result<BuildRequest> {
        let defines = match &self.define_table {
            Some(path) => DefineTable::load(path)
                .with_context(|| format!("Failed to load define table {:?}", path))?,
            None => DefineTable::empty(),
        };

        let mut request = BuildRequest::new(&self.source_dir, &self.python, &self.gpu_arch)
            .with_projects(self.projects.clone())
            .with_defines(defines)
            .with_artifacts(ArtifactQuery::new("dist", &self.artifact_suffix));
        if let Some(patch_dir) = &self.patch_dir {
            request = request.with_patch_dir(patch_dir);
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return ExitCode::from(code),
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                artifacts = report.artifacts.len(),
                "Build finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parse arguments, or the exit status to stop with. Usage errors exit 1
/// like every other failure; `--help` and `--version` exit 0.
fn parse_args<I, T>(args: I) -> std::result::Result<Cli, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        let _ = e.print();
        if e.use_stderr() {
            1
        } else {
            0
        }
    })
}

async fn run(cli: &Cli) -> Result<BuildReport> {
    if !cli.source_dir.is_dir() {
        bail!("Source directory {:?} does not exist", cli.source_dir);
    }

    let request = cli.build_request()?;
    let resolver = ToolkitResolver::new(cli.resolver_config());
    let mut pipeline = BuildPipeline::new(Arc::new(TracingSink));

    let report = pipeline
        .run(&request, &resolver)
        .await
        .context("Build failed")?;

    if let Some(path) = &cli.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

fn write_report(report: &BuildReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
    info!("Report written to {:?}", path);
    Ok(())
}
