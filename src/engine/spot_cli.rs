//! Engine backed by Spot's command-line tools.
//!
//! | Operation | Invocation |
//! |-----------|------------|
//! | class | `ltlfilt -f F --format=%[v]h` |
//! | translate | `ltl2tgba -B -C --high -H -f F` |
//! | containment | `ltlfilt -q -f F2 --included-in=F1` |
//! | equivalence | `ltlfilt -q -f F1 --equivalent-to=F2` |
//! | random formula | `randltl -n 1 --seed=S N`, then `ltlfilt -r --relabel=abc -f F` |
//! | propositions | `ltlfilt -f F --format=%x` |
//! | LaTeX | `ltlfilt --sclatex -f F` |
//!
//! `ltlfilt -q` reports a match through its exit status: 0 when the formula
//! passed the filter, 1 when it did not, anything else on error.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{AnalysisEngine, hoa};
use crate::constants::ENGINE_TIMEOUT;
use crate::error::{Error, Result};
use crate::graph::AutomatonGraph;

const LTLFILT: &str = "ltlfilt";
const LTL2TGBA: &str = "ltl2tgba";
const RANDLTL: &str = "randltl";

/// Runs Spot's tools as subprocesses.
#[derive(Debug, Clone)]
pub struct SpotCli {
    /// Directory holding the tools; `PATH` lookup when unset.
    bin_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for SpotCli {
    fn default() -> Self {
        Self {
            bin_dir: None,
            timeout: ENGINE_TIMEOUT,
        }
    }
}

impl SpotCli {
    /// Creates an engine that finds the tools on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks the tools up in `dir` instead of `PATH`.
    #[must_use]
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn program(&self, tool: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => Path::new(tool).to_path_buf(),
        }
    }

    /// Runs `tool` and returns its output whatever the exit status.
    async fn invoke(&self, tool: &str, args: &[&str]) -> Result<Output> {
        tracing::debug!(tool, ?args, "running spot tool");

        let mut cmd = Command::new(self.program(tool));
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Engine(format!("{tool} timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::Engine(format!("failed to run {tool}: {e}")))
    }

    /// Runs `tool` and returns its trimmed stdout, failing on nonzero exit.
    async fn stdout(&self, tool: &str, args: &[&str]) -> Result<String> {
        let output = self.invoke(tool, args).await?;
        if !output.status.success() {
            return Err(tool_failure(tool, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs an `ltlfilt -q` filter and reads the verdict from the exit code.
    async fn filter(&self, args: &[&str]) -> Result<bool> {
        let output = self.invoke(LTLFILT, args).await?;
        filter_verdict(&output)
    }

}

fn tool_failure(tool: &str, output: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Error::Engine(format!("{tool} exited with {}", output.status))
    } else {
        Error::Engine(stderr)
    }
}

fn filter_verdict(output: &Output) -> Result<bool> {
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(tool_failure(LTLFILT, output)),
    }
}

/// Splits the `%x` listing: names separated by `, `, double-quoted when
/// they are not plain identifiers.
fn parse_ap_list(text: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut chars = text.trim().chars().peekable();

    while chars.peek().is_some() {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut name = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            name.push(escaped);
                        }
                    }
                    Some(c) => name.push(c),
                    None => {
                        return Err(Error::Engine(format!(
                            "unterminated proposition in '{text}'"
                        )));
                    }
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                name.push(c);
            }
            name.truncate(name.trim_end().len());
        }

        match chars.next() {
            None | Some(',') => {}
            Some(other) => {
                return Err(Error::Engine(format!(
                    "unexpected '{other}' in proposition list '{text}'"
                )));
            }
        }
        if !name.is_empty() {
            names.push(name);
        }
    }

    Ok(names)
}

#[async_trait]
impl AnalysisEngine for SpotCli {
    fn name(&self) -> &str {
        "spot-cli"
    }

    async fn mp_class(&self, formula: &str) -> Result<String> {
        self.stdout(LTLFILT, &["-f", formula, "--format=%[v]h"]).await
    }

    async fn translate(&self, formula: &str) -> Result<AutomatonGraph> {
        let text = self
            .stdout(LTL2TGBA, &["-B", "-C", "--high", "-H", "-f", formula])
            .await?;
        let mut graph = hoa::parse(&text)?;
        graph.attributes.formula = formula.to_string();
        Ok(graph)
    }

    async fn contains(&self, formula1: &str, formula2: &str) -> Result<bool> {
        let included_in = format!("--included-in={formula1}");
        self.filter(&["-q", "-f", formula2, &included_in]).await
    }

    async fn equiv(&self, formula1: &str, formula2: &str) -> Result<bool> {
        let equivalent_to = format!("--equivalent-to={formula2}");
        self.filter(&["-q", "-f", formula1, &equivalent_to]).await
    }

    async fn rand_ltl(&self, num_ap: u32, seed: u64) -> Result<String> {
        let seed = format!("--seed={seed}");
        let num_ap = num_ap.to_string();
        let raw = self.stdout(RANDLTL, &["-n", "1", &seed, &num_ap]).await?;
        if raw.is_empty() {
            return Err(Error::Engine("randltl produced no formula".into()));
        }
        self.stdout(LTLFILT, &["-r", "--relabel=abc", "-f", &raw])
            .await
    }

    async fn atomic_propositions(&self, formula: &str) -> Result<Vec<String>> {
        let listed = self.stdout(LTLFILT, &["-f", formula, "--format=%x"]).await?;
        parse_ap_list(&listed)
    }

    async fn to_latex(&self, formula: &str) -> Result<String> {
        self.stdout(LTLFILT, &["--sclatex", "-f", formula]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn output(code: i32, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_verdict_from_exit_code() {
        assert!(filter_verdict(&output(0, "")).unwrap());
        assert!(!filter_verdict(&output(1, "")).unwrap());

        let err = filter_verdict(&output(2, "ltlfilt: syntax error")).unwrap_err();
        assert_eq!(err.to_string(), "analysis engine error: ltlfilt: syntax error");
    }

    #[test]
    fn test_program_lookup() {
        let engine = SpotCli::new();
        assert_eq!(engine.program("ltlfilt"), PathBuf::from("ltlfilt"));

        let engine = SpotCli::new().with_bin_dir("/opt/spot/bin");
        assert_eq!(engine.program("ltlfilt"), PathBuf::from("/opt/spot/bin/ltlfilt"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SpotCli::new().with_bin_dir(dir.path());
        let err = engine.mp_class("Fa").await.unwrap_err();
        assert!(matches!(err, Error::Engine(ref msg) if msg.contains("failed to run ltlfilt")));
    }

    #[test]
    fn test_parse_ap_list() {
        assert_eq!(parse_ap_list("a, b, c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(parse_ap_list("").unwrap(), Vec::<String>::new());
        assert_eq!(
            parse_ap_list(r#""a b", x, "c\"d""#).unwrap(),
            vec!["a b", "x", "c\"d"]
        );
        assert!(parse_ap_list(r#""open"#).is_err());
        assert!(parse_ap_list(r#""a" b"#).is_err());
    }

    // =========================================================================
    // Tool Invocation Tests
    // =========================================================================

    /// Writes a shell stand-in for `tool` that records its argv to
    /// `<tool>.args`, prints `stdout`, and exits with `code`.
    #[cfg(unix)]
    fn fake_tool(dir: &Path, tool: &str, stdout: &str, code: i32) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(tool);
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"$0.args\"\ncat <<'OUT'\n{stdout}\nOUT\nexit {code}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn recorded_args(dir: &Path, tool: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(format!("{tool}.args")))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mp_class_invocation() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), LTLFILT, "recurrence", 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        assert_eq!(engine.mp_class("G(a -> Fb)").await.unwrap(), "recurrence");
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-f", "G(a -> Fb)", "--format=%[v]h"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_contains_filters_second_by_first() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SpotCli::new().with_bin_dir(dir.path());

        fake_tool(dir.path(), LTLFILT, "", 0);
        assert!(engine.contains("Fa", "Ga").await.unwrap());
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-q", "-f", "Ga", "--included-in=Fa"]
        );

        fake_tool(dir.path(), LTLFILT, "", 1);
        assert!(!engine.contains("Ga", "Fa").await.unwrap());
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-q", "-f", "Fa", "--included-in=Ga"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_equiv_invocation() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), LTLFILT, "", 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        assert!(engine.equiv("Fa", "F(a)").await.unwrap());
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-q", "-f", "Fa", "--equivalent-to=F(a)"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rand_ltl_relabels_output() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), RANDLTL, "p0 U Gp1", 0);
        fake_tool(dir.path(), LTLFILT, "a U Gb", 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        assert_eq!(engine.rand_ltl(2, 7).await.unwrap(), "a U Gb");
        assert_eq!(
            recorded_args(dir.path(), RANDLTL),
            vec!["-n", "1", "--seed=7", "2"]
        );
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-r", "--relabel=abc", "-f", "p0 U Gp1"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_to_latex_invocation() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), LTLFILT, r"\G a", 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        assert_eq!(engine.to_latex("Ga").await.unwrap(), r"\G a");
        assert_eq!(recorded_args(dir.path(), LTLFILT), vec!["--sclatex", "-f", "Ga"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translate_parses_tool_output() {
        let hoa = r#"HOA: v1
name: "G(!a | Fb)"
States: 2
Start: 0
AP: 2 "a" "b"
acc-name: Buchi
Acceptance: 1 Inf(0)
properties: trans-labels explicit-labels state-acc complete
properties: deterministic stutter-invariant
--BODY--
State: 0 {0}
[!0 | 1] 0
[0&!1] 1
State: 1
[1] 0
[!1] 1
--END--"#;
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), LTL2TGBA, hoa, 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        let graph = engine.translate("G(a -> Fb)").await.unwrap();
        assert_eq!(
            recorded_args(dir.path(), LTL2TGBA),
            vec!["-B", "-C", "--high", "-H", "-f", "G(a -> Fb)"]
        );
        assert_eq!(graph.attributes.formula, "G(a -> Fb)");
        assert_eq!(graph.attributes.ap_names, vec!["a", "b"]);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.accepting_states().collect::<Vec<_>>(), vec![0]);
        let labels: Vec<_> = graph.out_edges(1).map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "!b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_atomic_propositions_skip_translation() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), LTLFILT, "a", 0);
        let engine = SpotCli::new().with_bin_dir(dir.path());

        // Only ltlfilt exists, and a tautology keeps its proposition.
        assert_eq!(engine.atomic_propositions("Xa | !Xa").await.unwrap(), vec!["a"]);
        assert_eq!(
            recorded_args(dir.path(), LTLFILT),
            vec!["-f", "Xa | !Xa", "--format=%x"]
        );

        fake_tool(dir.path(), LTLFILT, r#"a, "x y""#, 0);
        assert_eq!(
            engine.atomic_propositions(r#"Fa & G"x y""#).await.unwrap(),
            vec!["a", "x y"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_error_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LTLFILT);
        std::fs::write(&path, "#!/bin/sh\necho 'ltlfilt: syntax error' >&2\nexit 2\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let engine = SpotCli::new().with_bin_dir(dir.path());

        let err = engine.to_latex("G(a ->").await.unwrap_err();
        assert_eq!(err.to_string(), "analysis engine error: ltlfilt: syntax error");
    }
}
