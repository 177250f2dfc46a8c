use sinkhound_core::{AddedLine, SinkhoundError};

/// The lines one file gained in a unified diff.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::parser::parse_unified_diff;
///
/// let diff = "\
/// diff --git a/hello.php b/hello.php
/// --- a/hello.php
/// +++ b/hello.php
/// @@ -1,2 +1,3 @@
///  <?php
/// +eval($code);
///  ?>
/// ";
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].added_lines[0].content, "eval($code);");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Path in the old version, `None` for new files.
    pub old_path: Option<String>,
    /// Path in the new version, `None` for deleted files.
    pub new_path: Option<String>,
    /// Added lines in diff order.
    pub added_lines: Vec<AddedLine>,
    /// Whether this is a newly created file.
    pub is_new_file: bool,
    /// Whether this file was deleted.
    pub is_deleted_file: bool,
    /// Whether this file was renamed.
    pub is_rename: bool,
}

/// Position inside a hunk body.
struct Hunk {
    old_remaining: u32,
    new_remaining: u32,
    next_line: u32,
}

enum HunkLine {
    Added(u32, String),
    Other,
    End,
}

impl Hunk {
    fn is_done(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    fn consume(&mut self, line: &str) -> HunkLine {
        if let Some(text) = line.strip_prefix('+') {
            let number = self.next_line;
            self.next_line += 1;
            self.new_remaining = self.new_remaining.saturating_sub(1);
            HunkLine::Added(number, text.trim().to_string())
        } else if line.starts_with('-') {
            self.old_remaining = self.old_remaining.saturating_sub(1);
            HunkLine::Other
        } else if line.starts_with('\\') {
            HunkLine::Other
        } else if line.is_empty() || line.starts_with(' ') {
            // Some tools strip the leading space of blank context lines.
            self.next_line += 1;
            self.old_remaining = self.old_remaining.saturating_sub(1);
            self.new_remaining = self.new_remaining.saturating_sub(1);
            HunkLine::Other
        } else {
            HunkLine::End
        }
    }
}

/// Parse a unified diff (as produced by `git diff` or `git2::Patch::to_buf`)
/// into the lines each file gained.
///
/// Header lines are never taken for additions: hunk bodies are delimited by
/// the line counts of their `@@` header, so an added line whose text starts
/// with `++ ` is still an addition. Binary files are skipped.
///
/// # Errors
///
/// Returns [`SinkhoundError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::parser::parse_unified_diff;
///
/// let files = parse_unified_diff("").unwrap();
/// assert!(files.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<FileDiff>, SinkhoundError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    let mut hunk: Option<Hunk> = None;
    let mut is_binary = false;
    let mut seen_hunk = false;

    for line in input.lines() {
        if let Some(h) = hunk.as_mut() {
            match h.consume(line) {
                HunkLine::Added(line_number, content) => {
                    if let Some(file) = current.as_mut() {
                        file.added_lines.push(AddedLine {
                            file_path: None,
                            line_number,
                            content,
                        });
                    }
                }
                HunkLine::Other => {}
                HunkLine::End => {
                    hunk = None;
                }
            }
            match hunk.as_ref().map(Hunk::is_done) {
                Some(true) => {
                    hunk = None;
                    continue;
                }
                Some(false) => continue,
                // The line that ended the hunk early is a header.
                None => {}
            }
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_file(&mut files, current.take(), is_binary);
            is_binary = false;
            seen_hunk = false;
            let (old_path, new_path) = parse_git_header(rest);
            current = Some(FileDiff {
                old_path,
                new_path,
                ..FileDiff::default()
            });
            continue;
        }

        // Patches without a "diff --git" line start a file at "--- ".
        if line.starts_with("--- ") && (current.is_none() || seen_hunk) {
            finish_file(&mut files, current.take(), is_binary);
            is_binary = false;
            seen_hunk = false;
            current = Some(FileDiff::default());
        }

        // Bare hunk text, as handed out per file by most git libraries.
        if line.starts_with("@@ ") && current.is_none() {
            current = Some(FileDiff::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if (line.starts_with("Binary files ") && line.ends_with(" differ"))
            || line == "GIT binary patch"
        {
            is_binary = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.is_new_file = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.is_deleted_file = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("rename from ") {
            file.is_rename = true;
            file.old_path = Some(unquote(path).to_string());
            continue;
        }

        if let Some(path) = line.strip_prefix("rename to ") {
            file.is_rename = true;
            file.new_path = Some(unquote(path).to_string());
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            file.old_path = parse_path(path);
            if file.old_path.is_none() {
                file.is_new_file = true;
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            file.new_path = parse_path(path);
            if file.new_path.is_none() {
                file.is_deleted_file = true;
            }
            continue;
        }

        if line.starts_with("@@ ") {
            let (_old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            seen_hunk = true;
            let h = Hunk {
                old_remaining: old_lines,
                new_remaining: new_lines,
                next_line: new_start.max(1),
            };
            if !h.is_done() {
                hunk = Some(h);
            }
            continue;
        }

        // index, mode, similarity and "\ No newline" lines carry nothing we need.
    }

    finish_file(&mut files, current.take(), is_binary);

    Ok(files)
}

/// Added lines of a single file patch, decoded permissively.
///
/// Invalid UTF-8 is replaced rather than rejected, and a patch that cannot be
/// parsed contributes no lines instead of failing the scan.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::parser::extract_added_lines;
///
/// let patch = b"--- a/a.py\n+++ b/a.py\n@@ -1 +1 @@\n-print('hello')\n+eval('danger')\n";
/// let lines = extract_added_lines(patch);
/// assert_eq!(lines.len(), 1);
/// assert_eq!(lines[0].file_path.as_deref(), Some("a.py"));
/// assert_eq!(lines[0].content, "eval('danger')");
/// ```
pub fn extract_added_lines(patch: &[u8]) -> Vec<AddedLine> {
    let text = String::from_utf8_lossy(patch);
    match parse_unified_diff(&text) {
        Ok(files) => files.into_iter().flat_map(|f| f.added_lines).collect(),
        Err(e) => {
            tracing::warn!("skipping unparseable patch: {e}");
            Vec::new()
        }
    }
}

fn finish_file(files: &mut Vec<FileDiff>, file: Option<FileDiff>, is_binary: bool) {
    let Some(mut file) = file else {
        return;
    };
    if is_binary {
        return;
    }
    if file.is_deleted_file {
        file.new_path = None;
    }
    for added in &mut file.added_lines {
        added.file_path = file.new_path.clone();
    }
    files.push(file);
}

fn parse_git_header(rest: &str) -> (Option<String>, Option<String>) {
    let rest = rest.trim();
    if let Some((old, new)) = rest.rsplit_once(" b/") {
        let old = old.strip_prefix("a/").unwrap_or(old);
        return (Some(old.to_string()), Some(new.to_string()));
    }
    if let Some((old, new)) = rest.split_once("\" \"") {
        return (parse_path(old), parse_path(new));
    }
    (None, None)
}

fn unquote(raw: &str) -> &str {
    raw.trim_matches('"')
}

fn parse_path(raw: &str) -> Option<String> {
    // Git appends a tab and timestamp in some patch flavours.
    let raw = raw.split('\t').next().unwrap_or(raw);
    let normalized = unquote(raw.trim_end());

    if normalized == "/dev/null" {
        return None;
    }

    let stripped = normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized);

    Some(stripped.to_string())
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), SinkhoundError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| SinkhoundError::Parse(format!("invalid hunk header: {line}")))?;

    let parts: Vec<&str> = inner.split(' ').collect();
    if parts.len() != 2 {
        return Err(SinkhoundError::Parse(format!("invalid hunk header: {line}")));
    }

    let old = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| SinkhoundError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| SinkhoundError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), SinkhoundError> {
    if let Some((start, count)) = range.split_once(',') {
        let s = start
            .parse()
            .map_err(|_| SinkhoundError::Parse(format!("invalid range number in: {context}")))?;
        let c = count
            .parse()
            .map_err(|_| SinkhoundError::Parse(format!("invalid range count in: {context}")))?;
        Ok((s, c))
    } else {
        let s = range
            .parse()
            .map_err(|_| SinkhoundError::Parse(format!("invalid range number in: {context}")))?;
        Ok((s, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(file: &FileDiff) -> Vec<&str> {
        file.added_lines.iter().map(|l| l.content.as_str()).collect()
    }

    #[test]
    fn empty_diff_returns_empty_vec() {
        let files = parse_unified_diff("").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn only_added_lines_are_kept() {
        let diff = "\
diff --git a/src/index.php b/src/index.php
index abc1234..def5678 100644
--- a/src/index.php
+++ b/src/index.php
@@ -1,3 +1,4 @@
 <?php
-echo $a;
+   system($cmd);
+echo $b;
 ?>
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path.as_deref(), Some("src/index.php"));
        assert_eq!(contents(&files[0]), vec!["system($cmd);", "echo $b;"]);
        assert_eq!(files[0].added_lines[0].line_number, 2);
        assert_eq!(files[0].added_lines[1].line_number, 3);
        assert_eq!(
            files[0].added_lines[0].file_path.as_deref(),
            Some("src/index.php")
        );
    }

    #[test]
    fn header_like_additions_are_still_additions() {
        let diff = "\
--- a/notes.txt
+++ b/notes.txt
@@ -1 +1,3 @@
 keep
+++ not a header
+--- nor this
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(contents(&files[0]), vec!["++ not a header", "--- nor this"]);
    }

    #[test]
    fn multiple_hunks_track_line_numbers() {
        let diff = "\
diff --git a/lib.php b/lib.php
--- a/lib.php
+++ b/lib.php
@@ -1,2 +1,3 @@
 function foo() {
+    bar();
 }
@@ -10,2 +11,3 @@
 function baz() {
+    qux();
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        let numbers: Vec<u32> = files[0].added_lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![2, 12]);
    }

    #[test]
    fn multiple_files_keep_order() {
        let diff = "\
diff --git a/a.php b/a.php
--- a/a.php
+++ b/a.php
@@ -1 +1,2 @@
 line1
+from a
diff --git a/b.php b/b.php
--- a/b.php
+++ b/b.php
@@ -1 +1,2 @@
 line1
+from b
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].new_path.as_deref(), Some("a.php"));
        assert_eq!(files[1].new_path.as_deref(), Some("b.php"));
        assert_eq!(contents(&files[1]), vec!["from b"]);
    }

    #[test]
    fn plain_patches_with_several_files() {
        let diff = "\
--- a/one.py
+++ b/one.py
@@ -0,0 +1 @@
+eval(x)
--- a/two.py
+++ b/two.py
@@ -0,0 +1 @@
+exec(y)
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].new_path.as_deref(), Some("two.py"));
        assert_eq!(contents(&files[1]), vec!["exec(y)"]);
    }

    #[test]
    fn new_file() {
        let diff = "\
diff --git a/new.php b/new.php
new file mode 100644
--- /dev/null
+++ b/new.php
@@ -0,0 +1,2 @@
+<?php
+eval($x);
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_new_file);
        assert!(files[0].old_path.is_none());
        assert_eq!(files[0].new_path.as_deref(), Some("new.php"));
        assert_eq!(contents(&files[0]), vec!["<?php", "eval($x);"]);
        assert_eq!(files[0].added_lines[0].line_number, 1);
    }

    #[test]
    fn deleted_file_has_no_path_and_no_lines() {
        let diff = "\
diff --git a/old.php b/old.php
deleted file mode 100644
--- a/old.php
+++ /dev/null
@@ -1,2 +0,0 @@
-<?php
-eval($x);
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_deleted_file);
        assert!(files[0].new_path.is_none());
        assert!(files[0].added_lines.is_empty());
    }

    #[test]
    fn deleted_empty_file_drops_header_path() {
        let diff = "\
diff --git a/empty.php b/empty.php
deleted file mode 100644
index e69de29..0000000
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].new_path.is_none());
        assert_eq!(files[0].old_path.as_deref(), Some("empty.php"));
    }

    #[test]
    fn renamed_file_uses_destination_path() {
        let diff = "\
diff --git a/old_name.php b/new_name.php
similarity index 90%
rename from old_name.php
rename to new_name.php
--- a/old_name.php
+++ b/new_name.php
@@ -1 +1,2 @@
 <?php
+eval($x);
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_rename);
        assert_eq!(files[0].old_path.as_deref(), Some("old_name.php"));
        assert_eq!(files[0].new_path.as_deref(), Some("new_name.php"));
        assert_eq!(
            files[0].added_lines[0].file_path.as_deref(),
            Some("new_name.php")
        );
    }

    #[test]
    fn binary_files_skipped() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
diff --git a/code.php b/code.php
--- a/code.php
+++ b/code.php
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path.as_deref(), Some("code.php"));
    }

    #[test]
    fn no_newline_at_eof_handled() {
        let diff = "\
diff --git a/f.php b/f.php
--- a/f.php
+++ b/f.php
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(contents(&files[0]), vec!["new"]);
    }

    #[test]
    fn blank_context_lines_without_space() {
        let diff = "\
--- a/f.php
+++ b/f.php
@@ -1,3 +1,4 @@
 a

+added
 c
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(contents(&files[0]), vec!["added"]);
        assert_eq!(files[0].added_lines[0].line_number, 3);
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let diff = r#"--- "a/src/my file.php"
+++ "b/src/my file.php"
@@ -1 +1,2 @@
 old
+new
"#;
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].old_path.as_deref(), Some("src/my file.php"));
        assert_eq!(files[0].new_path.as_deref(), Some("src/my file.php"));
    }

    #[test]
    fn bare_hunk_without_file_headers() {
        let files = parse_unified_diff("@@ -0,0 +1 @@\n+eval($x);\n").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].new_path.is_none());
        assert_eq!(files[0].added_lines.len(), 1);
        assert_eq!(files[0].added_lines[0].content, "eval($x);");
        assert_eq!(files[0].added_lines[0].line_number, 1);
    }

    #[test]
    fn bare_hunks_stay_in_one_file() {
        let patch = b"\
@@ -1 +1 @@
-print('hello')
+eval('danger')
@@ -10,2 +10,3 @@
 a
+--- not a header
 b
";
        let lines = extract_added_lines(patch);
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].line_number, lines[0].content.as_str()), (1, "eval('danger')"));
        assert_eq!((lines[1].line_number, lines[1].content.as_str()), (11, "--- not a header"));
    }

    #[test]
    fn malformed_hunk_header_is_an_error() {
        let diff = "--- a/x\n+++ b/x\n@@ nonsense @@\n+eval()\n";
        assert!(matches!(
            parse_unified_diff(diff),
            Err(SinkhoundError::Parse(_))
        ));
    }

    #[test]
    fn extract_recovers_from_invalid_utf8() {
        let mut patch = b"--- a/x.php\n+++ b/x.php\n@@ -0,0 +1 @@\n+eval(\"".to_vec();
        patch.extend_from_slice(&[0xff, 0xfe]);
        patch.extend_from_slice(b"\");\n");
        let lines = extract_added_lines(&patch);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].content.starts_with("eval(\""));
        assert!(lines[0].content.contains('\u{FFFD}'));
    }

    #[test]
    fn extract_swallows_parse_errors() {
        let lines = extract_added_lines(b"--- a/x\n+++ b/x\n@@ broken\n+eval()\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn parse_path_handles_dev_null_and_tabs() {
        assert_eq!(parse_path("/dev/null"), None);
        assert_eq!(
            parse_path("b/src/a.php\t2024-01-01 00:00:00"),
            Some("src/a.php".to_string())
        );
    }
}
