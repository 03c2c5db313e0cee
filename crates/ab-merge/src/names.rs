//! Branch-name generation.
//!
//! Resonance-search models emit one output per hypothesis of the signal grid,
//! named `<base>_mass<M>_spin<S>` (single output) or
//! `<base>_mass<M>_spin<S>_<class>` (multiclass output). Arbitrary name lists
//! can also be read from a text file, one name per line.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use ab_core::{validate_column_name, Error, Result};
use serde::Deserialize;

/// Resonance masses (GeV) of the signal grid.
pub const DEFAULT_MASSES: [u32; 25] = [
    250, 260, 270, 280, 300, 320, 350, 400, 450, 500, 550, 600, 650, 700, 750, 800, 850, 900, 1000,
    1250, 1500, 1750, 2000, 2500, 3000,
];

/// Resonance spins: 0 (radion) and 2 (graviton).
pub const DEFAULT_SPINS: [u32; 2] = [0, 2];

/// Output classes of the multiclass model.
pub const DEFAULT_CLASSES: [&str; 3] = ["hh", "tt", "dy"];

fn default_classes() -> Vec<String> {
    DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()
}

/// Discrete parameter grid the names are generated from.
///
/// Can be loaded from YAML:
///
/// ```yaml
/// masses: [250, 300, 500]
/// spins: [0, 2]
/// classes: [hh, tt, dy]   # optional
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterGrid {
    /// Mass points, in generation order.
    pub masses: Vec<u32>,
    /// Spin hypotheses, in generation order.
    pub spins: Vec<u32>,
    /// Class labels for multiclass outputs.
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            masses: DEFAULT_MASSES.to_vec(),
            spins: DEFAULT_SPINS.to_vec(),
            classes: default_classes(),
        }
    }
}

impl ParameterGrid {
    /// Parse and validate a YAML grid.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let grid: ParameterGrid = serde_yaml_ng::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid parameter grid: {e}")))?;
        grid.validate()?;
        Ok(grid)
    }

    /// Read, parse and validate a YAML grid file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read grid file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Reject empty axes, repeated values and class labels that cannot end a column name.
    pub fn validate(&self) -> Result<()> {
        if self.masses.is_empty() || self.spins.is_empty() {
            return Err(Error::Configuration(
                "parameter grid needs at least one mass and one spin".into(),
            ));
        }
        check_unique("mass", &self.masses)?;
        check_unique("spin", &self.spins)?;
        check_unique("class", &self.classes)?;
        for class in &self.classes {
            if class.is_empty() || !class.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::Configuration(format!("invalid class label '{class}'")));
            }
        }
        Ok(())
    }

    /// Number of names the grid yields.
    pub fn len(&self, multiclass: bool) -> usize {
        let n = self.masses.len() * self.spins.len();
        if multiclass { n * self.classes.len() } else { n }
    }

    /// `true` when the grid yields no names.
    pub fn is_empty(&self, multiclass: bool) -> bool {
        self.len(multiclass) == 0
    }
}

fn check_unique<T>(axis: &str, values: &[T]) -> Result<()>
where
    T: std::hash::Hash + Eq + std::fmt::Display,
{
    let mut seen = HashSet::with_capacity(values.len());
    for v in values {
        if !seen.insert(v) {
            return Err(Error::Configuration(format!("duplicate {axis} '{v}' in parameter grid")));
        }
    }
    Ok(())
}

/// `<base>_mass<M>_spin<S>`, spins outer, masses inner.
pub fn parametrized_names<'a>(
    base: &'a str,
    grid: &'a ParameterGrid,
) -> impl Iterator<Item = String> + 'a {
    grid.spins.iter().flat_map(move |spin| {
        grid.masses.iter().map(move |mass| format!("{base}_mass{mass}_spin{spin}"))
    })
}

/// `<base>_mass<M>_spin<S>_<class>`, spins outer, then masses, classes innermost.
pub fn multiclass_names<'a>(
    base: &'a str,
    grid: &'a ParameterGrid,
) -> impl Iterator<Item = String> + 'a {
    parametrized_names(base, grid)
        .flat_map(move |stem| grid.classes.iter().map(move |class| format!("{stem}_{class}")))
}

/// Lazy reader of a newline-delimited name list.
///
/// Surrounding whitespace is trimmed and blank lines are skipped.
#[derive(Debug)]
pub struct BranchList<R> {
    lines: Lines<R>,
}

impl BranchList<BufReader<File>> {
    /// Open a name list file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Configuration(format!("failed to open branch list {}: {e}", path.display()))
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> BranchList<R> {
    /// Read names from any buffered reader.
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

impl<R: BufRead> Iterator for BranchList<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    let name = line.trim();
                    if !name.is_empty() {
                        return Some(Ok(name.to_string()));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Where the column names of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    /// Just the base name.
    Single,
    /// One name per non-empty line of a text file.
    FromFile(PathBuf),
    /// `<base>_mass<M>_spin<S>` over a grid.
    Parametrized(ParameterGrid),
    /// `<base>_mass<M>_spin<S>_<class>` over a grid.
    Multiclass(ParameterGrid),
}

/// Boxed stream of names.
pub type Names<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// Enumerate the names of `source`, prefixed by `base` for the generated kinds.
///
/// Generated names are checked against the column-name rules up front so a bad
/// base name fails before any table is touched. File names are passed through
/// as read; they are validated when their column is declared.
pub fn generate_names<'a>(base: &'a str, source: &'a NameSource) -> Result<Names<'a>> {
    if !matches!(source, NameSource::FromFile(_)) {
        validate_column_name(base)?;
    }
    Ok(match source {
        NameSource::Single => Box::new(std::iter::once(Ok(base.to_string()))),
        NameSource::FromFile(path) => Box::new(BranchList::open(path)?),
        NameSource::Parametrized(grid) => Box::new(parametrized_names(base, grid).map(Ok)),
        NameSource::Multiclass(grid) => Box::new(multiclass_names(base, grid).map(Ok)),
    })
}
