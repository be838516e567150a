//! The fixed build lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of the fixed build lifecycle, in total execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Clean,
    Compile,
    Resources,
    Test,
    Archive,
    Publish,
}

impl Stage {
    /// All stages in lifecycle order
    pub fn all() -> [Stage; 6] {
        [
            Self::Clean,
            Self::Compile,
            Self::Resources,
            Self::Test,
            Self::Archive,
            Self::Publish,
        ]
    }

    /// The lifecycle prefix ending at `target`, inclusive
    pub fn through(target: Stage) -> impl Iterator<Item = Stage> {
        Self::all().into_iter().filter(move |stage| *stage <= target)
    }

    /// The stage preceding this one, if any
    pub fn predecessor(self) -> Option<Stage> {
        let all = Self::all();
        let position = all.iter().position(|stage| *stage == self)?;
        position.checked_sub(1).map(|p| all[p])
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Compile => "compile",
            Self::Resources => "resources",
            Self::Test => "test",
            Self::Archive => "archive",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Self::Clean),
            "compile" => Ok(Self::Compile),
            "resources" => Ok(Self::Resources),
            "test" => Ok(Self::Test),
            "archive" => Ok(Self::Archive),
            "publish" => Ok(Self::Publish),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_totally_ordered() {
        assert!(Stage::Clean < Stage::Compile);
        assert!(Stage::Compile < Stage::Resources);
        assert!(Stage::Resources < Stage::Test);
        assert!(Stage::Test < Stage::Archive);
        assert!(Stage::Archive < Stage::Publish);
    }

    #[test]
    fn through_yields_inclusive_prefix() {
        let stages: Vec<Stage> = Stage::through(Stage::Test).collect();
        assert_eq!(
            stages,
            vec![Stage::Clean, Stage::Compile, Stage::Resources, Stage::Test]
        );
    }

    #[test]
    fn predecessor_walks_backwards() {
        assert_eq!(Stage::Clean.predecessor(), None);
        assert_eq!(Stage::Publish.predecessor(), Some(Stage::Archive));
    }

    #[rstest::rstest]
    #[case("clean", Stage::Clean)]
    #[case("compile", Stage::Compile)]
    #[case("resources", Stage::Resources)]
    #[case("test", Stage::Test)]
    #[case("archive", Stage::Archive)]
    #[case("publish", Stage::Publish)]
    fn parses_stage_names(#[case] text: &str, #[case] expected: Stage) {
        assert_eq!(text.parse::<Stage>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_stage_names() {
        assert!("deploy".parse::<Stage>().is_err());
    }
}
