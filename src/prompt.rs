/// Build the prompt sent to the skill service.
///
/// A non-empty selection takes precedence over the document; the document
/// text is only used when nothing is selected.  Empty inputs are not
/// rejected: the result may consist of newlines alone, and the service
/// decides what to do with it.
pub fn build_prompt(
    user_prompt: Option<&str>,
    selection: Option<&str>,
    document: &str,
    wrap_selection_in_code_block: bool,
) -> String {
    let prompt = user_prompt.unwrap_or("");

    match selection.filter(|s| !s.is_empty()) {
        Some(selected) if wrap_selection_in_code_block => {
            format!("{prompt}\n```\n{selected}\n```")
        }
        Some(selected) => format!("{prompt}\n{selected}\n"),
        None => format!("{prompt}\n{document}"),
    }
}
