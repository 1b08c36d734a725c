//! Ready-made guarded actions for common file edits.

use crate::remote::Command;
use crate::remote::shell::{quote, quote_path};

use super::guard::GuardedAction;

/// Ensures `line` appears verbatim in the file at `path`.
///
/// The file is created if missing. A line that is already present (as a
/// whole line) is never appended a second time. A file whose last line
/// lacks a newline gets one before the append.
#[must_use]
pub fn line_in_file(path: &str, line: &str) -> GuardedAction {
    let file = quote_path(path);
    let line_q = quote(line);

    GuardedAction::new(
        format!("line in {path}"),
        format!("grep -qxF -- {line_q} {file}"),
        format!(
            "{{ [ ! -s {file} ] || [ -z \"$(tail -c1 {file})\" ] || printf '\\n'; printf '%s\\n' {line_q}; }} >> {file}"
        ),
    )
}

/// Writes `content` to `dest` on the target.
///
/// Without `overwrite` an existing file is left alone; with it, the file is
/// rewritten whenever its content differs. Parent directories are created.
/// The content travels on the command's standard input.
#[must_use]
pub fn upload_file(dest: &str, content: &[u8], mode: Option<&str>, overwrite: bool) -> GuardedAction {
    let file = quote_path(dest);

    let probe = if overwrite {
        Command::new(format!("cmp -s - {file}")).stdin(content)
    } else {
        Command::new(format!("test -f {file}"))
    };

    let mut write = format!("mkdir -p -- \"$(dirname -- {file})\" && cat > {file}");
    if let Some(mode) = mode {
        write.push_str(&format!(" && chmod {} {file}", quote(mode)));
    }

    GuardedAction {
        description: format!("file {dest}"),
        probe: Some(probe),
        apply: vec![Command::new(write).stdin(content)],
    }
}
