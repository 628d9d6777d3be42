use std::fmt;

/// A fatal, task-independent problem discovered while building the task graph: unlike a
/// [`anvil_process::BuildError`], this never reaches the scheduler — it aborts
/// configuration before any task can run.
#[derive(Debug, Eq, PartialEq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Platform- and project-wide knobs for the C++ compile/link rules.
#[derive(Clone, Debug)]
pub struct Options {
    pub compiler: String,
    pub linker: String,
    /// Directory prefix under which object files are written, e.g. `"objs/"`.
    pub obj_prefix: String,
    pub obj_suffix: String,
    pub exe_suffix: String,
    /// Extra prerequisites every `CPP`/`LINK` task depends on in addition to what it
    /// discovers on its own (e.g. a shared build-config header).
    pub depends: Vec<String>,
    pub cpp_flags: Vec<String>,
    pub link_libs: Vec<String>,
}

impl Options {
    /// Resolves platform-appropriate defaults. Windows is deliberately unsupported: there
    /// is no portable default for `cl.exe`'s flag syntax here, so this is a configuration
    /// error rather than a silently wrong guess.
    pub fn for_host() -> Result<Options, ConfigError> {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: &str) -> Result<Options, ConfigError> {
        let (compiler, linker) = match os {
            "linux" => ("g++".to_string(), "g++".to_string()),
            "macos" => ("clang++".to_string(), "clang++".to_string()),
            other => {
                return Err(ConfigError(format!(
                    "no default C++ toolchain for platform \"{other}\""
                )));
            }
        };
        Ok(Options {
            compiler,
            linker,
            obj_prefix: "objs/".to_string(),
            obj_suffix: ".o".to_string(),
            exe_suffix: String::new(),
            depends: Vec::new(),
            cpp_flags: vec!["-std=c++2a".to_string(), "-Wall".to_string(), "-Werror".to_string(), "-g".to_string()],
            link_libs: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_defaults_to_g_plus_plus() {
        let opts = Options::for_os("linux").unwrap();
        assert_eq!(opts.compiler, "g++");
    }

    #[test]
    fn macos_defaults_to_clang_plus_plus() {
        let opts = Options::for_os("macos").unwrap();
        assert_eq!(opts.compiler, "clang++");
    }

    #[test]
    fn windows_has_no_default_toolchain() {
        let err = Options::for_os("windows").unwrap_err();
        assert!(err.0.contains("windows"));
    }
}
