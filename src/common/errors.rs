use log::error;

/// Log the full context chain of `error` and hand it back to the caller.
pub fn handle_error(error: anyhow::Error) -> anyhow::Error {
    let chain = error
        .chain()
        .enumerate()
        .map(|(i, cause)| format!("{i}: {cause}"))
        .collect::<Vec<_>>()
        .join("\n");
    error!("{}", chain);
    error
}
