//! Immutable run configuration built once from the parsed command line.

use std::path::PathBuf;

use anyhow::{bail, Result};

use ab_core::KeyFields;
use ab_merge::{CommitPolicy, MergeConfig, MergeMode, NameSource, ParameterGrid};

use crate::Cli;

/// Everything a run needs, resolved and validated.
#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub input: PathBuf,
    pub target: PathBuf,
    pub base_name: String,
    pub input_tree: String,
    pub target_tree: String,
    pub names: NameSource,
    pub merge: MergeConfig,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let grid_requested = cli.multiclass || cli.parametrized;
        if cli.grid.is_some() && !grid_requested {
            bail!("--grid requires -p or -m");
        }

        let names = if let Some(path) = &cli.branches {
            if grid_requested {
                tracing::warn!("--branches given, ignoring -p/-m");
            }
            NameSource::FromFile(path.clone())
        } else if grid_requested {
            let grid = match &cli.grid {
                Some(path) => ParameterGrid::from_yaml_file(path)?,
                None => ParameterGrid::default(),
            };
            if cli.multiclass {
                NameSource::Multiclass(grid)
            } else {
                NameSource::Parametrized(grid)
            }
        } else {
            NameSource::Single
        };

        let mode = if cli.keyed {
            MergeMode::Keyed(KeyFields {
                run: cli.run_field.clone(),
                event: cli.event_field.clone(),
                lumi: cli.lumi_field.clone(),
            })
        } else {
            MergeMode::Positional
        };

        let merge = MergeConfig {
            mode,
            value_type: cli.value_type,
            target_prefix: cli.target_prefix.clone(),
            commit: if cli.commit_each {
                CommitPolicy::EachColumn
            } else {
                CommitPolicy::EndOfBatch
            },
        };

        Ok(Self {
            input: cli.input.clone().unwrap_or_default(),
            target: cli.target.clone().unwrap_or_default(),
            base_name: cli.name.clone(),
            input_tree: cli.input_tree.clone(),
            target_tree: cli.target_tree.clone(),
            names,
            merge,
            dry_run: cli.dry_run,
            report: cli.report.clone(),
        })
    }

    pub fn log(&self) {
        let names = match &self.names {
            NameSource::Single => "single".to_string(),
            NameSource::FromFile(p) => format!("file {}", p.display()),
            NameSource::Parametrized(g) => format!("parametrized ({} names)", g.len(false)),
            NameSource::Multiclass(g) => format!("multiclass ({} names)", g.len(true)),
        };
        let mode = match &self.merge.mode {
            MergeMode::Positional => "positional".to_string(),
            MergeMode::Keyed(k) => format!("keyed on ({}, {}, {})", k.run, k.event, k.lumi),
        };
        tracing::info!(
            input = %self.input.display(),
            input_tree = %self.input_tree,
            target = %self.target.display(),
            target_tree = %self.target_tree,
            name = %self.base_name,
            names = %names,
            mode = %mode,
            value_type = %self.merge.value_type,
            "running addbranch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("addbranch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_are_single_positional_f32() {
        let cfg = RunConfig::from_cli(&parse(&["-i", "in.parquet", "-t", "out.parquet"])).unwrap();
        assert_eq!(cfg.names, NameSource::Single);
        assert_eq!(cfg.base_name, "hbtresdnn");
        assert_eq!(cfg.input_tree, "hbtres");
        assert_eq!(cfg.target_tree, "HTauTauTree");
        assert_eq!(cfg.merge.mode, MergeMode::Positional);
        assert_eq!(cfg.merge.value_type, ab_core::ScalarType::F32);
        assert_eq!(cfg.merge.commit, CommitPolicy::EndOfBatch);
    }

    #[test]
    fn test_bool_flags_accept_bare_and_explicit_values() {
        let cfg = RunConfig::from_cli(&parse(&["-i", "a", "-t", "b", "-p"])).unwrap();
        assert!(matches!(cfg.names, NameSource::Parametrized(_)));

        let cfg = RunConfig::from_cli(&parse(&["-i", "a", "-t", "b", "-p", "false"])).unwrap();
        assert_eq!(cfg.names, NameSource::Single);

        let cfg = RunConfig::from_cli(&parse(&["-i", "a", "-t", "b", "-m", "true", "-p", "true"]))
            .unwrap();
        assert!(matches!(cfg.names, NameSource::Multiclass(_)));
    }

    #[test]
    fn test_branches_take_precedence() {
        let cli = parse(&["-i", "a", "-t", "b", "-m", "--branches", "names.txt"]);
        let cfg = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(cfg.names, NameSource::FromFile(PathBuf::from("names.txt")));
    }

    #[test]
    fn test_keyed_mode_with_custom_fields() {
        let cli = parse(&[
            "-i",
            "a",
            "-t",
            "b",
            "--keyed",
            "--event_field",
            "evt",
            "--value_type",
            "f64",
        ]);
        let cfg = RunConfig::from_cli(&cli).unwrap();
        match &cfg.merge.mode {
            MergeMode::Keyed(k) => {
                assert_eq!(k.run, "RunNumber");
                assert_eq!(k.event, "evt");
                assert_eq!(k.lumi, "lumi");
            }
            other => panic!("unexpected mode {other:?}"),
        }
        assert_eq!(cfg.merge.value_type, ab_core::ScalarType::F64);
    }

    #[test]
    fn test_grid_without_grid_mode_is_rejected() {
        assert!(RunConfig::from_cli(&parse(&["-i", "a", "-t", "b", "--grid", "g.yaml"])).is_err());
    }

    #[test]
    fn test_missing_required_paths_fail_to_parse() {
        assert!(Cli::try_parse_from(["addbranch", "-t", "b"]).is_err());
        assert!(Cli::try_parse_from(["addbranch", "--dry_run"]).is_ok());
        let bad_type = ["addbranch", "-i", "a", "-t", "b", "--value_type", "f16"];
        assert!(Cli::try_parse_from(bad_type).is_err());
    }
}
