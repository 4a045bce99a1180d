use crate::stat::Series;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Everything a backend needs to draw run vs. reference for one variable.
#[derive(Debug, Clone, Copy)]
pub struct PlotRequest<'a> {
    pub case_name: &'a str,
    pub case_dir: &'a Path,
    pub variable: &'a str,
    pub run: &'a Series,
    pub reference: &'a Series,
}

impl PlotRequest<'_> {
    pub fn output_path(&self) -> PathBuf {
        self.case_dir
            .join(format!("{}_{}.png", self.case_name, self.variable))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("plotting is disabled")]
    Disabled,
    #[error("cannot write plot data '{}': {source}", path.display())]
    WriteData {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{program}' exited with status {status}")]
    Exit { program: String, status: String },
    #[error("plot '{}' was not produced", path.display())]
    NoOutput { path: PathBuf },
}

/// Renders a comparison chart and returns the path of the image.
pub trait PlotRenderer {
    fn render(&self, request: &PlotRequest<'_>) -> Result<PathBuf, PlotError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPlotRenderer;

impl PlotRenderer for DisabledPlotRenderer {
    fn render(&self, _request: &PlotRequest<'_>) -> Result<PathBuf, PlotError> {
        Err(PlotError::Disabled)
    }
}

#[derive(Debug, Clone)]
pub struct GnuplotRenderer {
    program: PathBuf,
}

impl Default for GnuplotRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gnuplot"),
        }
    }
}

impl GnuplotRenderer {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PlotRenderer for GnuplotRenderer {
    fn render(&self, request: &PlotRequest<'_>) -> Result<PathBuf, PlotError> {
        let run_data = request.case_dir.join("data1.dat");
        let reference_data = request.case_dir.join("data2.dat");
        let output = request.output_path();

        let result = write_plot_data(&run_data, request.run)
            .and_then(|()| write_plot_data(&reference_data, request.reference))
            .and_then(|()| {
                let script = gnuplot_script(request, &run_data, &reference_data, &output);
                self.run_gnuplot(&script)
            });

        let _ = fs::remove_file(&run_data);
        let _ = fs::remove_file(&reference_data);
        result?;

        if output.is_file() {
            Ok(output)
        } else {
            Err(PlotError::NoOutput { path: output })
        }
    }
}

impl GnuplotRenderer {
    fn run_gnuplot(&self, script: &str) -> Result<(), PlotError> {
        let program = self.program.display().to_string();
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlotError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|source| PlotError::Spawn {
                    program: program.clone(),
                    source,
                })?;
        }

        let status = child.wait().map_err(|source| PlotError::Spawn {
            program: program.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(PlotError::Exit {
                program,
                status: status.to_string(),
            })
        }
    }
}

fn write_plot_data(path: &Path, series: &Series) -> Result<(), PlotError> {
    let mut content = String::new();
    for (s, value) in series.points() {
        content.push_str(&format!("{}\t{}\n", s, value));
    }
    fs::write(path, content).map_err(|source| PlotError::WriteData {
        path: path.to_path_buf(),
        source,
    })
}

/// `rms_x` becomes `rms(x)`; names with no or several underscores stay as-is.
pub fn pretty_variable(variable: &str) -> String {
    let parts: Vec<&str> = variable.split('_').collect();
    match parts.as_slice() {
        [name, component] => format!("{}({})", name, component),
        [name, ..] => (*name).to_string(),
        [] => variable.to_string(),
    }
}

fn gnuplot_script(
    request: &PlotRequest<'_>,
    run_data: &Path,
    reference_data: &Path,
    output: &Path,
) -> String {
    let pretty = pretty_variable(request.variable);
    let units = &request.run.units;
    let run_data = run_data.display();
    let reference_data = reference_data.display();

    let mut script = String::new();
    script.push_str("set terminal pngcairo\n");
    script.push_str(&format!("set output '{}'\n", output.display()));
    script.push_str(&format!("set title '{}'\n", request.case_name));
    script.push_str("set key below\n");
    script.push_str("set ytics nomirror\n");
    script.push_str("set y2tics\n");
    script.push_str(&format!(
        "set ylabel '{} [{}]' font 'Helvetica-Bold,20'\n",
        pretty, units
    ));
    script.push_str(&format!(
        "set y2label 'delta {} [{}]' font 'Helvetica-Bold,20'\n",
        pretty, units
    ));
    script.push_str("set xlabel 's [m]' font 'Helvetica-Bold,20'\n");
    script.push_str(&format!(
        "plot '{}' u 1:2 w l lw 2 t '{}', '{}' u 1:2 w l lw 2 t '{}', \"< paste {} {}\" u 1:($2-$4) w l lw 2 axis x1y2 t 'difference';\n",
        run_data,
        request.run.revision,
        reference_data,
        request.reference.revision,
        run_data,
        reference_data
    ));
    script
}
