// External LaTeX compiler invocation
use crate::domain::error::ReportError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Lines of compiler output kept in error messages.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct LatexCompiler {
    program: String,
}

impl LatexCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Compile `tex_path` inside its own directory and return the PDF path.
    pub async fn compile(&self, tex_path: &Path) -> Result<PathBuf, ReportError> {
        let (Some(work_dir), Some(file_name)) = (tex_path.parent(), tex_path.file_name()) else {
            return Err(ReportError::Compile(format!(
                "not a document path: {}",
                tex_path.display()
            )));
        };

        tracing::debug!("Compiling {} with {}", tex_path.display(), self.program);

        let output = Command::new(&self.program)
            .arg("-halt-on-error")
            .arg("-interaction=nonstopmode")
            .arg(file_name)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ReportError::Compile(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let lines: Vec<&str> = stdout.lines().collect();
            let tail = lines[lines.len().saturating_sub(OUTPUT_TAIL_LINES)..].join("\n");
            return Err(ReportError::Compile(format!(
                "{} exited with {}:\n{}",
                self.program, output.status, tail
            )));
        }

        Ok(tex_path.with_extension("pdf"))
    }
}
