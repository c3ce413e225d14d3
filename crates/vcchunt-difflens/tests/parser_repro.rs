use vcchunt_difflens::{is_noise, parse_patch};

#[test]
fn parse_patch_without_git_header() {
    let diff = "\
--- /dev/null
+++ b/src/bad_code.c
@@ -0,0 +1,3 @@
+int main(void) {
+    return 0;
+}
";
    let files = parse_patch(diff).unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].is_new_file);
    assert_eq!(files[0].target_path(), Some("src/bad_code.c"));
}

#[test]
fn comment_only_hunk_has_no_significant_lines() {
    let diff = "\
diff --git a/src/a.go b/src/a.go
--- a/src/a.go
+++ b/src/a.go
@@ -3,2 +3,3 @@
 func f() {
+\t// guard against nil input
 }
";
    let files = parse_patch(diff).unwrap();
    let significant_changes = files[0]
        .lines()
        .filter(|l| !l.is_context())
        .filter(|l| !is_noise(&l.value))
        .count();
    assert_eq!(significant_changes, 0);
}
