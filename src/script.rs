/// Split editor text into statements. A script containing `@` (variable
/// declarations and the like) is always one statement; anything else splits
/// on blank lines. Chunks keep their order and lose surrounding whitespace.
pub fn split_statements(text: &str) -> Vec<String> {
    if text.contains('@') {
        return vec![text.to_string()];
    }

    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rejoin chunks with one blank line between them. The executor submits the
/// joined text as a single command, so split-then-join leaves the submitted
/// script unchanged apart from whitespace normalisation.
pub fn join_statements(statements: &[String]) -> String {
    statements.join("\n\n")
}

/// What actually goes over the wire for a given editor text.
pub fn command_text(text: &str) -> String {
    join_statements(&split_statements(text))
}
