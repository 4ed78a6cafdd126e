//! Action grammar parser: freeform directive text to an [`ActionBundle`].
//!
//! Parsing is pure and never fails. The text is tokenized into fenced blocks
//! and action markers (with byte offsets); markers inside a fenced block are
//! payload, not directives. File markers are then matched greedily to the
//! nearest unclaimed block that starts after them.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::actions::{
    ActionBundle, BugAction, CommandAction, DelegateTaskAction, FileAction, FileActionKind,
    PathAction, SystemAction, TaskStatus,
};

static SYSTEM_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bSYSTEM_ACTION:[ \t]*([A-Z][A-Z_]*)\b(.*)").expect("system marker regex")
});
static ACTION_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bACTION:[ \t]*([A-Z][A-Z_]*)\b(.*)").expect("action marker regex")
});
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*=\s*"((?:[^"\\]|\\.)*)""#).expect("param regex")
});

const TASK_COMPLETE_MARKER: &str = "TASK_COMPLETE:";
const TASK_BLOCKED_MARKER: &str = "TASK_BLOCKED:";

/// A fenced block located in the directive text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FencedBlock {
    /// Offset of the opening fence line.
    start: usize,
    /// Offset just past the closing fence line.
    end: usize,
    /// Text between the fence lines.
    content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerFamily {
    System,
    Action,
}

#[derive(Debug, Clone)]
struct Marker {
    family: MarkerFamily,
    name: String,
    start: usize,
    end: usize,
    params: BTreeMap<String, String>,
}

impl Marker {
    /// Non-blank parameter value.
    fn param(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Parse a directive into its structured actions.
///
/// `task` enables `TASK_COMPLETE` / `TASK_BLOCKED` detection; the completion
/// marker only counts when its text matches the task exactly.
pub fn parse_directive(text: &str, task: Option<&str>) -> ActionBundle {
    let blocks = find_fenced_blocks(text);
    let markers = find_markers(text, &blocks);

    let mut bundle = ActionBundle::default();
    for marker in markers.iter().filter(|m| m.family == MarkerFamily::System) {
        if bundle.system_action.is_none() {
            bundle.system_action = system_action(marker);
        }
    }

    for marker in markers.iter().filter(|m| m.family == MarkerFamily::Action) {
        match marker.name.as_str() {
            "LIST_DIRECTORY" if bundle.list_directory_action.is_none() => {
                bundle.list_directory_action = marker.param("path").map(|path| PathAction { path });
            }
            "READ_FILE" if bundle.read_file_action.is_none() => {
                bundle.read_file_action = marker.param("path").map(|path| PathAction { path });
            }
            "DELEGATE_TASK" if bundle.delegate_task_action.is_none() => {
                if let (Some(role), Some(description)) =
                    (marker.param("role"), marker.param("description"))
                {
                    bundle.delegate_task_action = Some(DelegateTaskAction { role, description });
                }
            }
            "RUN_TEST_COMMAND" if bundle.command_action.is_none() => {
                bundle.command_action = marker
                    .param("command")
                    .map(|command| CommandAction { command });
            }
            "REPORT_BUG" => {
                if let Some(description) = marker.param("description") {
                    bundle.bug_actions.push(BugAction::Report {
                        description,
                        severity: marker.param("severity"),
                    });
                }
            }
            "VERIFY_BUG" => {
                if let Some(id) = marker.param("id") {
                    bundle.bug_actions.push(BugAction::Verify {
                        id,
                        status: marker.param("status"),
                        notes: marker.param("notes"),
                    });
                }
            }
            "FIX_BUG" => {
                if let Some(id) = marker.param("id") {
                    bundle.bug_actions.push(BugAction::Fix {
                        id,
                        notes: marker.param("notes"),
                    });
                }
            }
            _ => {}
        }
    }

    bundle.file_actions = associate_file_actions(&markers, &blocks);
    bundle.task_status = task.and_then(|task| task_status(text, &blocks, task));
    bundle
}

fn system_action(marker: &Marker) -> Option<SystemAction> {
    match marker.name.as_str() {
        "CHANGE_PHASE" => marker
            .param("phase")
            .map(|phase| SystemAction::ChangePhase { phase }),
        "CHANGE_STATUS" => marker
            .param("status")
            .map(|status| SystemAction::ChangeStatus { status }),
        "WAIT" => Some(SystemAction::Wait {
            reason: marker.param("reason"),
        }),
        "REQUEST_USER_INPUT" => Some(SystemAction::RequestUserInput {
            prompt: marker.param("prompt"),
        }),
        _ => None,
    }
}

fn file_action_kind(name: &str) -> Option<FileActionKind> {
    match name {
        "CREATE_FILE" => Some(FileActionKind::CreateFile),
        "MODIFY_FILE" => Some(FileActionKind::ModifyFile),
        "CREATE_DIRECTORY" => Some(FileActionKind::CreateDirectory),
        _ => None,
    }
}

/// Pair file markers with fenced blocks.
///
/// Each CREATE/MODIFY marker, in text order, claims the first unclaimed block
/// starting after it, even when the marker itself is malformed. Dropped
/// actions do not take part in `(kind, path)` deduplication.
fn associate_file_actions(markers: &[Marker], blocks: &[FencedBlock]) -> Vec<FileAction> {
    let mut claimed = vec![false; blocks.len()];
    let mut seen = HashSet::new();
    let mut actions = Vec::new();

    for marker in markers.iter().filter(|m| m.family == MarkerFamily::Action) {
        let Some(kind) = file_action_kind(&marker.name) else {
            continue;
        };

        let content = if kind == FileActionKind::CreateDirectory {
            None
        } else {
            let next = blocks
                .iter()
                .enumerate()
                .find(|(idx, block)| !claimed[*idx] && block.start > marker.end)
                .map(|(idx, _)| idx);
            next.map(|idx| {
                claimed[idx] = true;
                blocks[idx].content.clone()
            })
        };

        let Some(path) = marker.param("path") else {
            continue;
        };
        let content = match kind {
            FileActionKind::CreateFile => Some(content.unwrap_or_default()),
            FileActionKind::ModifyFile => match content {
                Some(body) if !body.trim().is_empty() => Some(body),
                _ => continue,
            },
            FileActionKind::CreateDirectory => None,
        };
        if !seen.insert((kind, path.clone())) {
            continue;
        }
        actions.push(FileAction {
            kind,
            path,
            content,
        });
    }
    actions
}

fn task_status(text: &str, blocks: &[FencedBlock], task: &str) -> Option<TaskStatus> {
    let task = task.trim();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if inside_block(blocks, line_start) {
            continue;
        }
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(TASK_COMPLETE_MARKER) {
            if unquote(rest) == task {
                return Some(TaskStatus::Complete);
            }
        } else if let Some(rest) = line.strip_prefix(TASK_BLOCKED_MARKER) {
            let reason = unquote(rest);
            if !reason.is_empty() {
                return Some(TaskStatus::Blocked {
                    reason: reason.to_string(),
                });
            }
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(value)
}

fn find_markers(text: &str, blocks: &[FencedBlock]) -> Vec<Marker> {
    let mut markers = Vec::new();
    for (family, re) in [
        (MarkerFamily::System, &*SYSTEM_MARKER_RE),
        (MarkerFamily::Action, &*ACTION_MARKER_RE),
    ] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(name), Some(rest)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if inside_block(blocks, whole.start()) {
                continue;
            }
            markers.push(Marker {
                family,
                name: name.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
                params: parse_params(rest.as_str()),
            });
        }
    }
    markers.sort_by_key(|marker| marker.start);
    markers
}

fn parse_params(rest: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for caps in PARAM_RE.captures_iter(rest) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            params
                .entry(key.as_str().to_string())
                .or_insert_with(|| unescape(value.as_str()));
        }
    }
    params
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn inside_block(blocks: &[FencedBlock], offset: usize) -> bool {
    blocks
        .iter()
        .any(|block| block.start <= offset && offset < block.end)
}

/// Locate closed backtick fences.
///
/// An opening fence is a line starting with three or more backticks; it is
/// closed by a backtick-only line at least as long. Unclosed fences are not
/// blocks, and the lines after them are scanned normally.
fn find_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        lines.push((offset, line));
        offset += line.len();
    }

    let mut blocks = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let (start, line) = lines[idx];
        let Some(fence_len) = opening_fence_len(line) else {
            idx += 1;
            continue;
        };
        let closer = (idx + 1..lines.len()).find(|&j| is_closing_fence(lines[j].1, fence_len));
        match closer {
            Some(j) => {
                let content_start = start + line.len();
                let (close_start, close_line) = lines[j];
                blocks.push(FencedBlock {
                    start,
                    end: close_start + close_line.len(),
                    content: text[content_start..close_start].to_string(),
                });
                idx = j + 1;
            }
            None => idx += 1,
        }
    }
    blocks
}

fn opening_fence_len(line: &str) -> Option<usize> {
    let ticks = line
        .trim_start()
        .chars()
        .take_while(|&c| c == '`')
        .count();
    (ticks >= 3).then_some(ticks)
}

fn is_closing_fence(line: &str, open_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= open_len && trimmed.chars().all(|c| c == '`')
}
