use anvil_process::BuildError;

/// The synthetic rule-target name passed to the compiler's dependency-only invocation
/// (`-MT "x "`), chosen so the emitted makefile fragment can be parsed the same way
/// regardless of the real object file's path.
pub const SENTINEL: &str = "x";

/// Parses the makefile fragment produced by a C++ front-end's `-E -M -MG -MT "x " -MF`
/// invocation into the list of dependency paths it names, sorted for a stable signature.
///
/// A missing depfile (no prior build) parses as an empty list rather than an error.
pub fn load_deps(contents: Option<&str>) -> Result<Vec<String>, BuildError> {
    let Some(contents) = contents else {
        return Ok(Vec::new());
    };

    // Flatten every line break (escaped or bare) to a single space: the whole fragment
    // describes one rule, however the compiler chose to wrap it.
    let flattened = contents.replace("\\\n", " ").replace('\n', " ");

    let tokens = tokenize(flattened.trim());
    if tokens.len() < 2 || tokens[0] != SENTINEL || tokens[1] != ":" {
        return Err(BuildError::new(format!(
            "malformed dependency file: expected \"{SENTINEL} :\", got {tokens:?}"
        )));
    }

    let mut deps: Vec<String> = tokens[2..].to_vec();
    deps.sort();
    Ok(deps)
}

/// Splits on whitespace not preceded by a backslash, unescaping `\ ` into a literal space
/// within a token.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&' ') {
            current.push(' ');
            chars.next();
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Removes every dependency already named in `explicit`, leaving the ones the compiler
/// discovered on its own.
pub fn extra_depends(deps: Vec<String>, explicit: &[String]) -> Vec<String> {
    deps.into_iter().filter(|d| !explicit.contains(d)).collect()
}

/// Rejects any discovered dependency that is itself a registered target: a header that is
/// generated by another rule can only be known to the scheduler after that rule has
/// already run once, which the engine refuses to paper over with a silent extra pass.
///
/// `is_registered` is consulted against the live task registry rather than a snapshot taken
/// at configuration time, since later-registered rules must still be caught.
pub fn reject_generated_headers(
    extra: &[String],
    is_registered: impl Fn(&str) -> bool,
) -> Result<(), BuildError> {
    let offending: Vec<&str> = extra.iter().map(String::as_str).filter(|d| is_registered(d)).collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(BuildError::new(format!(
            "dependency on generated file(s) not allowed: {}",
            offending.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_missing_depfile_parses_as_no_dependencies() {
        assert_eq!(load_deps(None).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn parses_the_sentinel_rule_and_sorts_its_dependencies() {
        let deps = load_deps(Some("x : src/Player.cpp include/Entity.h include/Player.h\n")).unwrap();
        assert_eq!(
            deps,
            vec!["include/Entity.h", "include/Player.h", "src/Player.cpp"]
        );
    }

    #[test]
    fn joins_backslash_continued_lines() {
        let deps =
            load_deps(Some("x : src/Player.cpp \\\n include/Player.h \\\n include/Entity.h\n"))
                .unwrap();
        assert_eq!(
            deps,
            vec!["include/Entity.h", "include/Player.h", "src/Player.cpp"]
        );
    }

    #[test]
    fn unescapes_a_space_within_a_path() {
        let deps = load_deps(Some("x : dir\\ with\\ spaces/header.h\n")).unwrap();
        assert_eq!(deps, vec!["dir with spaces/header.h"]);
    }

    #[test]
    fn rejects_a_fragment_without_the_sentinel() {
        load_deps(Some("objs/Player.o: src/Player.cpp\n")).unwrap_err();
    }

    #[test]
    fn explicit_depends_are_filtered_out() {
        let deps = vec!["src/Player.cpp".to_string(), "include/Player.h".to_string()];
        let explicit = vec!["src/Player.cpp".to_string()];
        assert_eq!(extra_depends(deps, &explicit), vec!["include/Player.h"]);
    }

    #[test]
    fn a_dependency_on_a_registered_target_is_rejected() {
        let known = ["objs/generated.h".to_string()];
        let err = reject_generated_headers(&["objs/generated.h".to_string()], |d| known.contains(&d.to_string()))
            .unwrap_err();
        assert!(err.0.contains("objs/generated.h"));
    }

    #[test]
    fn a_dependency_outside_the_registry_is_accepted() {
        let known = ["objs/generated.h".to_string()];
        reject_generated_headers(&["include/Player.h".to_string()], |d| known.contains(&d.to_string())).unwrap();
    }
}
