//! Interface to the external finite-element solver.
//!
//! The solver meshes parts, runs jobs and reports per-step convergence.
//! [`CommandSolver`] drives an external executable through files in the
//! working area; tests substitute their own [`Solver`].

use crate::error::SolverError;
use brickfem_ir::{ModelDocument, PartDef, Vec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, info, warn};

/// A mesh node of a part, in part coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshNode {
    /// Node label.
    pub label: u64,
    /// Position.
    pub position: Vec3,
}

/// Outcome of one analysis step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepStatus {
    /// Reached the end of the step.
    Completed,
    /// Stopped before the end of the step.
    Aborted(String),
    /// Never started.
    #[default]
    NotRun,
}

impl StepStatus {
    /// Parse a solver status string.
    pub fn from_solver_status(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "completed" | "complete" | "finished" | "success" => Self::Completed,
            "" | "not run" | "skipped" | "pending" => Self::NotRun,
            _ => Self::Aborted(status.to_string()),
        }
    }

    /// Whether the step reached its end.
    pub fn is_completed(&self) -> bool {
        matches!(self, StepStatus::Completed)
    }
}

/// Convergence record of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step name.
    pub name: String,
    /// Outcome.
    pub status: StepStatus,
    /// Last converged increment, if any converged.
    #[serde(default)]
    pub last_converged_increment: Option<u32>,
    /// Step time reached at the last converged increment.
    #[serde(default)]
    pub time_reached: f64,
}

/// Everything a finished job reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Job name.
    pub job: String,
    /// Result archive.
    pub archive: PathBuf,
    /// Step records in step order.
    pub steps: Vec<StepReport>,
}

impl JobReport {
    /// Record of a step, if the solver reported it.
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Record of a step the model defines.
    pub fn require(&self, name: &str) -> Result<&StepReport, SolverError> {
        self.step(name).ok_or_else(|| SolverError::MissingStep {
            job: self.job.clone(),
            step: name.to_string(),
        })
    }
}

/// The solver collaborator.
pub trait Solver {
    /// Mesh `part` with the global element size and return the nodes of
    /// the named set.
    fn mesh_set_nodes(
        &mut self,
        part: &PartDef,
        mesh_size: f64,
        set: &str,
        workdir: &Path,
    ) -> Result<Vec<MeshNode>, SolverError>;

    /// Run the model as a job named after it and block until it ends.
    fn run(&mut self, doc: &ModelDocument, workdir: &Path) -> Result<JobReport, SolverError>;
}

/// How to learn that a submitted job has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionWait {
    /// Wait for the solver process to exit.
    #[default]
    Block,
    /// Ask on the terminal; some solver front ends crash while blocking.
    Confirm,
}

/// External solver command and job resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Executable.
    pub command: String,
    /// Arguments placed before the subcommand.
    pub args: Vec<String>,
    /// CPUs per job.
    pub cpus: u32,
    /// Completion wait strategy.
    pub wait: CompletionWait,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            command: "brickfem-solver".to_string(),
            args: Vec::new(),
            cpus: 4,
            wait: CompletionWait::Block,
        }
    }
}

/// Model file of a job.
pub fn model_path(workdir: &Path, job: &str) -> PathBuf {
    workdir.join(format!("{job}.model.json"))
}

/// Report file of a job.
pub fn report_path(workdir: &Path, job: &str) -> PathBuf {
    workdir.join(format!("{job}.report.json"))
}

/// Node file of a part's set.
pub fn nodes_path(workdir: &Path, part: &str, set: &str) -> PathBuf {
    workdir.join(format!("{part}.{set}.nodes.json"))
}

/// Solver driven through an external executable.
///
/// `<command> <args..> mesh --part <file> --size <h> --set <set> --out <file>`
/// writes the nodes of a set; `<command> <args..> run --model <file>
/// --cpus <n> --report <file>` runs a job.
#[derive(Debug, Clone, Default)]
pub struct CommandSolver {
    settings: SolverSettings,
}

impl CommandSolver {
    /// Create a solver with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.command);
        cmd.args(&self.settings.args).current_dir(workdir);
        cmd
    }
}

/// Wait for `child` after the user confirmed that `job` has finished.
///
/// Prompts on stderr and reads one line from `input`. A process still
/// running after the confirmation is waited for, so the report is only read
/// once the solver has exited. If `input` is closed the process is killed
/// and reaped.
pub fn wait_confirmed<R: BufRead>(
    child: &mut Child,
    job: &str,
    input: &mut R,
) -> Result<ExitStatus, SolverError> {
    let mut stderr = std::io::stderr();
    write!(
        stderr,
        "Wait until job '{job}' has finished, then press Enter: "
    )?;
    stderr.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        if child.try_wait()?.is_none() {
            warn!(job = %job, "no confirmation, stopping solver process");
            child.kill()?;
            child.wait()?;
        }
        return Err(SolverError::Unconfirmed {
            job: job.to_string(),
        });
    }
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    warn!(job = %job, "solver process still running after confirmation, waiting");
    Ok(child.wait()?)
}

impl Solver for CommandSolver {
    fn mesh_set_nodes(
        &mut self,
        part: &PartDef,
        mesh_size: f64,
        set: &str,
        workdir: &Path,
    ) -> Result<Vec<MeshNode>, SolverError> {
        let part_file = workdir.join(format!("{}.part.json", part.name));
        fs::write(&part_file, serde_json::to_string_pretty(part)?)?;
        let out = nodes_path(workdir, &part.name, set);
        let status = self
            .command(workdir)
            .arg("mesh")
            .arg("--part")
            .arg(&part_file)
            .arg("--size")
            .arg(mesh_size.to_string())
            .arg("--set")
            .arg(set)
            .arg("--out")
            .arg(&out)
            .status()?;
        if !out.exists() {
            return Err(SolverError::MissingReport {
                status: status.to_string(),
                path: out,
            });
        }
        let nodes: Vec<MeshNode> = serde_json::from_str(&fs::read_to_string(&out)?)?;
        debug!(part = %part.name, set, nodes = nodes.len(), "meshed set");
        Ok(nodes)
    }

    fn run(&mut self, doc: &ModelDocument, workdir: &Path) -> Result<JobReport, SolverError> {
        let job = &doc.name;
        let model = model_path(workdir, job);
        let report = report_path(workdir, job);
        fs::write(&model, doc.to_json()?)?;
        // A stale report would be mistaken for this job's outcome.
        if report.exists() {
            fs::remove_file(&report)?;
        }

        let mut cmd = self.command(workdir);
        cmd.arg("run")
            .arg("--model")
            .arg(&model)
            .arg("--cpus")
            .arg(self.settings.cpus.to_string())
            .arg("--report")
            .arg(&report);
        info!(job = %job, cpus = self.settings.cpus, "submitted job");

        let status = match self.settings.wait {
            CompletionWait::Block => cmd.status()?.to_string(),
            CompletionWait::Confirm => {
                let mut child = cmd.spawn()?;
                wait_confirmed(&mut child, job, &mut std::io::stdin().lock())?.to_string()
            }
        };

        if !report.exists() {
            return Err(SolverError::MissingReport {
                status,
                path: report,
            });
        }
        let parsed: JobReport = serde_json::from_str(&fs::read_to_string(&report)?)?;
        debug!(job = %parsed.job, steps = parsed.steps.len(), "read job report");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(StepStatus::from_solver_status("COMPLETED"), StepStatus::Completed);
        assert_eq!(StepStatus::from_solver_status(""), StepStatus::NotRun);
        assert_eq!(
            StepStatus::from_solver_status("too many attempts"),
            StepStatus::Aborted("too many attempts".to_string())
        );
    }

    #[test]
    fn report_lookup() {
        let report: JobReport = serde_json::from_str(
            r#"{"job": "tower", "archive": "tower.odb", "steps": [
                {"name": "widen", "status": "Completed", "last_converged_increment": 1, "time_reached": 1.0},
                {"name": "contact", "status": {"Aborted": "diverged"}}
            ]}"#,
        )
        .unwrap();
        assert!(report.require("widen").unwrap().status.is_completed());
        let contact = report.step("contact").unwrap();
        assert_eq!(contact.last_converged_increment, None);
        assert!(!contact.status.is_completed());
        assert!(matches!(
            report.require("free"),
            Err(SolverError::MissingStep { step, .. }) if step == "free"
        ));
    }

    #[test]
    fn settings_defaults_fill_missing_keys() {
        let s: SolverSettings = serde_json::from_str(r#"{"command": "fe-run", "wait": "confirm"}"#).unwrap();
        assert_eq!(s.command, "fe-run");
        assert_eq!(s.cpus, 4);
        assert_eq!(s.wait, CompletionWait::Confirm);
        assert!(s.args.is_empty());
    }

    #[test]
    fn missing_executable_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut solver = CommandSolver::new(SolverSettings {
            command: "brickfem-no-such-solver".to_string(),
            ..SolverSettings::default()
        });
        let doc = ModelDocument::new("job", brickfem_ir::AnalysisKind::Standard, 1.0);
        assert!(matches!(solver.run(&doc, dir.path()), Err(SolverError::Io(_))));
        assert!(model_path(dir.path(), "job").exists());
    }

    #[cfg(unix)]
    mod command {
        use super::*;
        use brickfem_ir::{AnalysisKind, ElementFamily};
        use std::collections::BTreeMap;
        use std::io::Cursor;

        const SCRIPTED: &str = r#"mode=$1; shift
while [ $# -gt 0 ]; do
  case $1 in
    --out|--report) out=$2 ;;
    --cpus) cpus=$2 ;;
    --set) set=$2 ;;
  esac
  shift 2
done
if [ "$mode" = mesh ]; then
  printf '[{"label": 7, "position": {"x": 1.0, "y": 0.5, "z": 0.0}}, {"label": 9, "position": {"x": 0.0, "y": 1.5, "z": -2.0}}]' > "$out"
else
  printf '{"job": "case-1", "archive": "case-1-cpus%s.odb", "steps": [{"name": "widen", "status": "Completed", "last_converged_increment": 3, "time_reached": 1.0}, {"name": "contact", "status": {"Aborted": "diverged"}}]}' "$cpus" > "$out"
fi
"#;

        fn solver(dir: &Path, script: &str) -> CommandSolver {
            let path = dir.join("solver.sh");
            fs::write(&path, script).unwrap();
            CommandSolver::new(SolverSettings {
                command: "sh".to_string(),
                args: vec![path.to_string_lossy().into_owned()],
                cpus: 2,
                wait: CompletionWait::Block,
            })
        }

        fn part() -> PartDef {
            PartDef {
                name: "regular-2x2-BOT".to_string(),
                root: 1,
                nodes: BTreeMap::new(),
                element: ElementFamily::HexReduced,
                partitions: Vec::new(),
                sets: BTreeMap::new(),
                surfaces: BTreeMap::new(),
                material: "ABS".to_string(),
            }
        }

        #[test]
        fn mesh_reads_set_nodes() {
            let dir = tempfile::tempdir().unwrap();
            let mut solver = solver(dir.path(), SCRIPTED);
            let nodes = solver
                .mesh_set_nodes(&part(), 0.5, "cont-bot-touch", dir.path())
                .unwrap();
            assert_eq!(
                nodes,
                vec![
                    MeshNode {
                        label: 7,
                        position: Vec3::new(1.0, 0.5, 0.0),
                    },
                    MeshNode {
                        label: 9,
                        position: Vec3::new(0.0, 1.5, -2.0),
                    },
                ]
            );
            assert!(dir.path().join("regular-2x2-BOT.part.json").exists());
            assert!(nodes_path(dir.path(), "regular-2x2-BOT", "cont-bot-touch").exists());
        }

        #[test]
        fn run_writes_model_and_reads_report() {
            let dir = tempfile::tempdir().unwrap();
            let mut solver = solver(dir.path(), SCRIPTED);
            let doc = ModelDocument::new("case-1", AnalysisKind::Standard, 0.5);
            let report = solver.run(&doc, dir.path()).unwrap();

            let written = ModelDocument::from_json(
                &fs::read_to_string(model_path(dir.path(), "case-1")).unwrap(),
            )
            .unwrap();
            assert_eq!(written, doc);
            assert_eq!(report.job, "case-1");
            assert_eq!(report.archive, PathBuf::from("case-1-cpus2.odb"));
            assert_eq!(report.steps.len(), 2);
            assert_eq!(report.require("widen").unwrap().last_converged_increment, Some(3));
            assert_eq!(
                report.require("contact").unwrap().status,
                StepStatus::Aborted("diverged".to_string())
            );
        }

        #[test]
        fn stale_report_is_not_returned() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                report_path(dir.path(), "case-1"),
                r#"{"job": "case-1", "archive": "old.odb", "steps": []}"#,
            )
            .unwrap();
            let mut solver = solver(dir.path(), "exit 3\n");
            let doc = ModelDocument::new("case-1", AnalysisKind::Standard, 0.5);
            match solver.run(&doc, dir.path()) {
                Err(SolverError::MissingReport { status, path }) => {
                    assert!(status.contains('3'), "{status}");
                    assert_eq!(path, report_path(dir.path(), "case-1"));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(!report_path(dir.path(), "case-1").exists());
        }

        #[test]
        fn confirmed_wait_reaps_the_process() {
            let mut child = Command::new("sh").args(["-c", "sleep 1"]).spawn().unwrap();
            let status = wait_confirmed(&mut child, "case-1", &mut Cursor::new("\n")).unwrap();
            assert!(status.success());
            assert!(child.try_wait().unwrap().is_some());
        }

        #[test]
        fn closed_input_stops_the_process() {
            let mut child = Command::new("sh").args(["-c", "sleep 30"]).spawn().unwrap();
            let err = wait_confirmed(&mut child, "case-1", &mut Cursor::new("")).unwrap_err();
            assert!(matches!(err, SolverError::Unconfirmed { job } if job == "case-1"));
            assert!(child.try_wait().unwrap().is_some());
        }
    }
}
