//! Command classifier.
//!
//! `classify` is pure and deterministic: same command in, same
//! [`Classification`] out, no I/O. Uses an allow-list for `auto`, never a
//! deny-list.

use std::collections::HashSet;

use tree_sitter::Parser;
use tree_sitter::Tree;
use tree_sitter_bash::LANGUAGE as BASH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Risk {
    RequiresManualReview,
    FilesystemMutation,
    NetworkAccess,
    PrivilegeEscalation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Auto,
    Prompt { risk: Risk, dangerous: bool },
    Deny { reason: String },
}

/// Classifies a command given a caller-provided deny set (may be empty) and
/// a set of commands the user has already approved this session.
pub fn classify(command: &[String], deny_list: &HashSet<Vec<String>>, approved: &HashSet<Vec<String>>) -> Classification {
    if deny_list.contains(command) {
        return Classification::Deny {
            reason: "command is on the session deny list".to_string(),
        };
    }
    if approved.contains(command) || is_known_safe_command(command) {
        return Classification::Auto;
    }
    Classification::Prompt {
        risk: risk_for(command),
        dangerous: is_dangerous(command),
    }
}

fn risk_for(command: &[String]) -> Risk {
    match command.first().map(String::as_str) {
        Some("rm" | "mv" | "cp" | "chmod" | "chown" | "truncate" | "dd") => {
            Risk::FilesystemMutation
        }
        Some("curl" | "wget" | "ssh" | "scp" | "nc" | "ping") => Risk::NetworkAccess,
        Some("sudo" | "su" | "doas") => Risk::PrivilegeEscalation,
        _ => Risk::RequiresManualReview,
    }
}

fn is_dangerous(command: &[String]) -> bool {
    matches!(
        risk_for(command),
        Risk::PrivilegeEscalation | Risk::FilesystemMutation
    ) || command.iter().any(|arg| arg == "-rf" || arg == "--force")
}

fn is_known_safe_command(command: &[String]) -> bool {
    if is_safe_to_call_with_exec(command) {
        return true;
    }

    matches!(
        command,
        [bash, flag, script]
            if bash == "bash"
                && flag == "-lc"
                && try_parse_bash(script)
                    .and_then(|tree| try_parse_single_word_only_command(&tree, script))
                    .is_some_and(|parsed| is_safe_to_call_with_exec(&parsed))
    )
}

fn is_safe_to_call_with_exec(command: &[String]) -> bool {
    match command.first().map(String::as_str) {
        Some(
            "cat" | "cd" | "echo" | "grep" | "head" | "ls" | "pwd" | "rg" | "tail" | "wc"
                | "which",
        ) => true,
        Some("find") => {
            const UNSAFE_FIND_OPTIONS: &[&str] = &[
                "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fls", "-fprint", "-fprint0",
                "-fprintf",
            ];
            !command
                .iter()
                .any(|arg| UNSAFE_FIND_OPTIONS.contains(&arg.as_str()))
        }
        Some("git") => matches!(
            command.get(1).map(String::as_str),
            Some("branch" | "status" | "log" | "diff" | "show")
        ),
        _ => false,
    }
}

fn try_parse_bash(script: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&BASH.into()).ok()?;
    parser.parse(script, None)
}

/// If `tree` represents a single command whose name and every argument is an
/// ordinary word, returns those words; otherwise `None`.
fn try_parse_single_word_only_command(tree: &Tree, src: &str) -> Option<Vec<String>> {
    if tree.root_node().has_error() {
        return None;
    }
    let root = tree.root_node();
    if root.kind() != "program" || root.named_child_count() != 1 {
        return None;
    }
    let cmd = root.named_child(0)?;
    if cmd.kind() != "command" {
        return None;
    }

    let mut words = Vec::new();
    let mut cursor = cmd.walk();
    for child in cmd.named_children(&mut cursor) {
        match child.kind() {
            "command_name" => {
                let word = child.named_child(0)?;
                if word.kind() != "word" {
                    return None;
                }
                words.push(word.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            "word" | "number" => {
                words.push(child.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            _ => return None,
        }
    }
    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn ls_is_auto_approved() {
        let empty = HashSet::new();
        assert_eq!(classify(&words("ls -la"), &empty, &empty), Classification::Auto);
    }

    #[test]
    fn rm_rf_is_prompt_and_dangerous() {
        let empty = HashSet::new();
        let result = classify(&words("rm -rf /tmp/x"), &empty, &empty);
        assert_eq!(
            result,
            Classification::Prompt {
                risk: Risk::FilesystemMutation,
                dangerous: true
            }
        );
    }

    #[test]
    fn deny_list_wins_over_auto() {
        let mut deny = HashSet::new();
        deny.insert(words("ls -la"));
        let result = classify(&words("ls -la"), &deny, &HashSet::new());
        assert!(matches!(result, Classification::Deny { .. }));
    }

    #[test]
    fn find_with_exec_is_not_auto() {
        let empty = HashSet::new();
        let result = classify(&words("find . -exec rm {} ;"), &empty, &empty);
        assert_ne!(result, Classification::Auto);
    }

    #[test]
    fn bash_lc_wrapping_safe_command_is_auto() {
        let empty = HashSet::new();
        let result = classify(
            &["bash".to_string(), "-lc".to_string(), "ls -la".to_string()],
            &empty,
            &empty,
        );
        assert_eq!(result, Classification::Auto);
    }
}
