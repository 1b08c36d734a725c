//! POSIX shell rendering for commands.
//!
//! Every transport that speaks to a shell turns a [`Command`] into one line
//! with [`render`]:
//!
//! ```text
//! sudo -n -H -u <user> -- sh -c '<exports>; cd <dir> || exit 126; <script>'
//! ```
//!
//! Environment values are exported inside the inner shell with double
//! quotes, so references such as `$PATH` or `$HOME` expand as the acting
//! user. Nothing is written to any profile file.

use std::borrow::Cow;

use super::command::Command;

/// Exit status used when the working directory cannot be entered.
pub const WORKDIR_EXIT_CODE: i32 = 126;

/// Quotes a word for a POSIX shell, leaving plain words untouched.
#[must_use]
pub fn quote(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));

    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// Quotes a remote path, keeping a leading `~` or `~/` expandable.
#[must_use]
pub fn quote_path(path: &str) -> String {
    if path == "~" {
        return String::from("\"$HOME\"");
    }
    match path.strip_prefix("~/") {
        Some("") => String::from("\"$HOME\"/"),
        Some(rest) => format!("\"$HOME\"/{}", quote(rest)),
        None => quote(path).into_owned(),
    }
}

/// Wraps a value in double quotes, escaping everything but `$`.
fn export_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders the script that runs inside `sh -c`.
#[must_use]
pub fn render_inner(command: &Command) -> String {
    let mut lines = Vec::with_capacity(command.env.len() + 2);

    for (key, value) in &command.env {
        lines.push(format!("export {key}={}", export_value(value)));
    }

    if let Some(dir) = &command.workdir {
        lines.push(format!("cd {} || exit {WORKDIR_EXIT_CODE}", quote_path(dir)));
    }

    lines.push(command.script.clone());
    lines.join("\n")
}

/// Renders the full command line, including the privilege switch.
#[must_use]
pub fn render(command: &Command) -> String {
    let inner = render_inner(command);

    match &command.as_user {
        Some(user) => format!("sudo -n -H -u {} -- sh -c {}", quote(user), quote(&inner)),
        None => format!("sh -c {}", quote(&inner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_and_special_words() {
        assert_eq!(quote("nginx"), "nginx");
        assert_eq!(quote("/etc/sudoers"), "/etc/sudoers");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_quote_path_keeps_home_expandable() {
        assert_eq!(quote_path("~"), "\"$HOME\"");
        assert_eq!(quote_path("~/.bashrc"), "\"$HOME\"/.bashrc");
        assert_eq!(quote_path("~/my dir"), "\"$HOME\"/'my dir'");
        assert_eq!(quote_path("/tmp/x"), "/tmp/x");
    }

    #[test]
    fn test_render_plain_command() {
        let command = Command::new("test -d ~/.rbenv");
        assert_eq!(render(&command), "sh -c 'test -d ~/.rbenv'");
    }

    #[test]
    fn test_render_as_user_with_env_and_workdir() {
        let command = Command::new("rbenv rehash")
            .as_user("deploy")
            .env("PATH", "/home/deploy/.rbenv/bin:$PATH")
            .workdir("~");

        let inner = render_inner(&command);
        assert_eq!(
            inner,
            "export PATH=\"/home/deploy/.rbenv/bin:$PATH\"\ncd \"$HOME\" || exit 126\nrbenv rehash"
        );

        let line = render(&command);
        assert!(line.starts_with("sudo -n -H -u deploy -- sh -c '"));
        assert!(line.ends_with("rbenv rehash'"));
    }

    #[test]
    fn test_export_value_escapes_quotes_but_not_dollar() {
        assert_eq!(export_value(r#"say "hi" $USER"#), r#""say \"hi\" $USER""#);
        assert_eq!(export_value("a`b`"), "\"a\\`b\\`\"");
    }
}
