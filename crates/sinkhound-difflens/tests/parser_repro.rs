use sinkhound_difflens::filter::ExtensionFilter;
use sinkhound_difflens::parser::{extract_added_lines, parse_unified_diff};

#[test]
fn parse_patch_without_git_header() {
    let diff = "\
--- /dev/null
+++ b/demo/bad_code.php
@@ -0,0 +1,3 @@
+<?php
+eval($_GET['x']);
+?>
";
    let files = parse_unified_diff(diff).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].new_path.as_deref(), Some("demo/bad_code.php"));
    assert!(files[0].is_new_file);
    assert_eq!(files[0].added_lines.len(), 3);
}

#[test]
fn filter_applies_per_file_in_mixed_patch() {
    let diff = b"\
diff --git a/app.py b/app.py
--- a/app.py
+++ b/app.py
@@ -1 +1,2 @@
 import os
+os.system(cmd)
diff --git a/web/app.js b/web/app.js
--- a/web/app.js
+++ b/web/app.js
@@ -1 +1,2 @@
 let x = 1;
+eval(x);
";
    let filter = ExtensionFilter::new([".js"]);
    let kept: Vec<_> = extract_added_lines(diff)
        .into_iter()
        .filter(|l| filter.admits(l))
        .collect();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].file_path.as_deref(), Some("web/app.js"));
    assert_eq!(kept[0].content, "eval(x);");
    assert_eq!(kept[0].line_number, 2);
}

#[test]
fn per_file_hunk_text_without_headers() {
    // Per-file diffs from git libraries often start straight at the hunk.
    let lines = extract_added_lines(b"@@ -1 +1 @@\n-print('hello')\n+eval('danger')\n");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].content, "eval('danger')");
    assert_eq!(lines[0].line_number, 1);
    assert!(lines[0].file_path.is_none());

    let lines = extract_added_lines(b"@@ -0,0 +1 @@\n+eval($x);\n");
    assert_eq!(lines.len(), 1);
}
