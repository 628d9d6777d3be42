use std::fmt;

/// Something a task can produce or depend on: either a path on disk, or a colon-prefixed
/// abstract name with no corresponding file (e.g. `:dist`, a phony top-level goal).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Target {
    File(String),
    Abstract(String),
}

impl Target {
    /// Parses a target string as written on a command line or in a rule declaration.
    /// A leading `:` marks an abstract target; everything else is a file path, with
    /// backslashes normalized to `/` so the same target string means the same thing on
    /// every platform.
    pub fn parse(raw: &str) -> Target {
        match raw.strip_prefix(':') {
            Some(rest) => Target::Abstract(rest.to_string()),
            None => Target::File(normalize(raw)),
        }
    }

    pub fn file(path: impl Into<String>) -> Target {
        Target::File(normalize(&path.into()))
    }

    pub fn abstract_(label: impl Into<String>) -> Target {
        Target::Abstract(label.into())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Target::Abstract(_))
    }

    pub fn as_file_path(&self) -> Option<&str> {
        match self {
            Target::File(p) => Some(p),
            Target::Abstract(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(p) => f.write_str(p),
            Target::Abstract(label) => write!(f, ":{label}"),
        }
    }
}

fn normalize(p: &str) -> String {
    p.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_prefix_is_abstract() {
        assert_eq!(Target::parse(":dist"), Target::Abstract("dist".to_string()));
    }

    #[test]
    fn bare_path_is_a_file_target() {
        assert_eq!(Target::parse("objs/a.o"), Target::File("objs/a.o".to_string()));
    }

    #[test]
    fn backslashes_normalize_to_forward_slashes() {
        assert_eq!(Target::parse(r"objs\a.o"), Target::File("objs/a.o".to_string()));
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for raw in [":dist", "src/main.cpp", "objs/x.o"] {
            assert_eq!(Target::parse(raw).to_string(), raw);
        }
    }
}
