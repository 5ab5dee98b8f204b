//! Dependency-ordered sorting of loader-script fragments.

use thiserror::Error;

/// A single line of generated shell-loader text, tagged with the package
/// that owns it and the names of packages whose snippets must precede it.
#[derive(Debug, Clone)]
pub struct Snippet {
    /// The owning package's name.
    pub name: String,
    /// Names of packages this snippet depends on (direct dependencies of
    /// the owning package).
    pub depends: Vec<String>,
    /// The literal line of shell text to emit.
    pub text: String,
}

/// Failure to produce a total order.
#[derive(Debug, Error)]
#[error("unable to sort load snippets (circular dependencies): {}", names.join(" "))]
pub struct CycleError {
    /// The packages still unsorted when no further progress could be made.
    pub names: Vec<String>,
}

/// Sorts `snippets` so that every snippet naming a dependency present in
/// the input set is emitted after all of that dependency's own snippets.
///
/// Dependencies on packages absent from the input are pruned first (an
/// optional peer dependency one just doesn't have snippets from). Ties are
/// broken by input order: among snippets that are simultaneously ready,
/// the one that appeared earlier in `snippets` is emitted first.
pub fn sort(snippets: &[Snippet]) -> Result<Vec<String>, CycleError> {
    let mut todo: Vec<Snippet> = snippets.to_vec();
    let known_names: std::collections::HashSet<&str> =
        todo.iter().map(|s| s.name.as_str()).collect();
    for snippet in &mut todo {
        snippet.depends.retain(|dep| known_names.contains(dep.as_str()));
    }

    let mut result = Vec::with_capacity(todo.len());
    let mut last_len = todo.len();
    while !todo.is_empty() {
        let mut i = 0;
        while i < todo.len() {
            if todo[i].depends.is_empty() {
                let done = todo.remove(i);
                let fully_emitted = !todo.iter().any(|s| s.name == done.name);
                if fully_emitted {
                    for other in &mut todo {
                        other.depends.retain(|dep| dep != &done.name);
                    }
                }
                result.push(done.text);
            } else {
                i += 1;
            }
        }
        if last_len == todo.len() {
            return Err(CycleError { names: todo.iter().map(|s| s.name.clone()).collect() });
        }
        last_len = todo.len();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snip(name: &str, depends: &[&str], text: &str) -> Snippet {
        Snippet {
            name: name.to_string(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
        }
    }

    #[test]
    fn orders_dependency_before_dependent() {
        let snippets = vec![snip("b", &["a"], "use b"), snip("a", &[], "use a")];
        let sorted = sort(&snippets).unwrap();
        assert_eq!(sorted, vec!["use a".to_string(), "use b".to_string()]);
    }

    #[test]
    fn prunes_unknown_dependencies_silently() {
        let snippets = vec![snip("a", &["not-present"], "use a")];
        let sorted = sort(&snippets).unwrap();
        assert_eq!(sorted, vec!["use a".to_string()]);
    }

    #[test]
    fn detects_cycles() {
        let snippets = vec![snip("a", &["b"], "use a"), snip("b", &["a"], "use b")];
        let err = sort(&snippets).unwrap_err();
        let mut names = err.names;
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn stable_among_simultaneously_ready_snippets() {
        let snippets = vec![snip("a", &[], "use a"), snip("b", &[], "use b")];
        let sorted = sort(&snippets).unwrap();
        assert_eq!(sorted, vec!["use a".to_string(), "use b".to_string()]);
    }
}
