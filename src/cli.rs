// ============================================================================
// NormalMaker CLI — headless project processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   NormalMaker --project rock.nm --export rock.png
//   NormalMaker --project rock.nm --normals 1 --export rock_n.png
//   NormalMaker --project rock.nm --normals "Layer (1)" --save rock.nm --cpu
//
// No window is opened in CLI mode.  The wgpu backend is used when an adapter
// exists, the CPU backend otherwise (or with --cpu).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::editor::Editor;
use crate::error::{Error, Result};
use crate::gpu;
use crate::settings::Settings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// NormalMaker headless project processor.
#[derive(Parser, Debug)]
#[command(
    name = "NormalMaker",
    version,
    about = "NormalMaker headless project processor",
    long_about = "Load a NormalMaker project (.nm), optionally regenerate the normal map of\n\
                  one layer from the project's normal arrows, and export the flattened\n\
                  composite as PNG without opening the GUI.\n\n\
                  Example:\n  \
                  NormalMaker --project rock.nm --normals 1 --export rock.png"
)]
pub struct CliArgs {
    /// Project file to load.
    #[arg(short, long, value_name = "FILE.nm")]
    pub project: PathBuf,

    /// Write the flattened composite to this PNG file.
    #[arg(short, long, value_name = "FILE.png")]
    pub export: Option<PathBuf>,

    /// Regenerate normals for this layer (index or exact name) before exporting.
    #[arg(short, long, value_name = "LAYER")]
    pub normals: Option<String>,

    /// Save the (possibly modified) project to this path.
    #[arg(short, long, value_name = "FILE.nm")]
    pub save: Option<PathBuf>,

    /// Use the CPU backend even when a GPU adapter is available.
    #[arg(long)]
    pub cpu: bool,

    /// Prefer the adapter whose name contains this text ("low power" for integrated).
    #[arg(long, value_name = "NAME", default_value = "")]
    pub gpu: String,

    /// Print per-step timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().skip(1).any(|a| {
            a == "--project" || a == "-p" || a.starts_with("--project=") || a == "--help" || a == "-h"
        })
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the requested steps and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_inner(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "CLI run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<()> {
    let start = Instant::now();
    let backend = gpu::open_backend(args.cpu, &args.gpu)?;
    let mut editor = Editor::new(backend, &Settings::default());
    if args.verbose {
        println!("backend: {}", editor.store.backend_name());
    }

    editor.open_project(&args.project)?;
    if args.verbose {
        println!(
            "loaded {} ({} layers, {} arrows) in {:.0}ms",
            args.project.display(),
            editor.store.len(),
            editor.arrows.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    if let Some(spec) = &args.normals {
        let index = resolve_layer(&editor, spec).ok_or_else(|| {
            Error::InvalidProject(format!("no layer matches '{spec}'"))
        })?;
        if !editor.select_layer(index) {
            return Err(Error::InvalidProject(format!(
                "layer {index} is not a normal layer"
            )));
        }
        let step = Instant::now();
        editor.store.generate_normals(index, &editor.arrows)?;
        if args.verbose {
            println!(
                "  normals for layer {index} ({:.0}ms)",
                step.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    if let Some(out) = &args.export {
        editor.export_png(out)?;
        println!("  → {}", out.display());
    }

    if let Some(out) = &args.save {
        editor.save_project(out)?;
        println!("  → {}", out.display());
    }
    Ok(())
}

/// A layer index, or else an exact layer name.
fn resolve_layer(editor: &Editor, spec: &str) -> Option<usize> {
    if let Ok(i) = spec.parse::<usize>() {
        return (i < editor.store.len()).then_some(i);
    }
    editor.store.layers().iter().position(|l| l.name == spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CpuBackend;

    #[test]
    fn parses_full_command_line() {
        let args = CliArgs::try_parse_from([
            "NormalMaker",
            "--project",
            "a.nm",
            "--export",
            "out.png",
            "--normals",
            "Layer (1)",
            "--cpu",
        ])
        .unwrap();
        assert_eq!(args.project, PathBuf::from("a.nm"));
        assert_eq!(args.export, Some(PathBuf::from("out.png")));
        assert_eq!(args.normals.as_deref(), Some("Layer (1)"));
        assert!(args.cpu);
        assert!(args.save.is_none());
    }

    #[test]
    fn project_is_required() {
        assert!(CliArgs::try_parse_from(["NormalMaker", "--export", "x.png"]).is_err());
    }

    #[test]
    fn layers_resolve_by_index_or_name() {
        let mut editor = Editor::new(Box::new(CpuBackend::new()), &Settings::default());
        editor.store.add_blank(1, 1).unwrap();
        editor.store.add_blank(1, 1).unwrap();
        assert_eq!(resolve_layer(&editor, "1"), Some(1));
        assert_eq!(resolve_layer(&editor, "5"), None);
        assert_eq!(resolve_layer(&editor, "Layer (0)"), Some(0));
        assert_eq!(resolve_layer(&editor, "missing"), None);
    }
}
