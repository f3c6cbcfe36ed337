// ABOUTME: Per-language heuristics recognising the line that defines a function
// ABOUTME: Strategy table keyed by file extension; unknown extensions fall back to substring search

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Decides whether one source line defines the function it was built for
pub type LineMatcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

type StrategyBuilder = fn(&str) -> LineMatcher;

/// Extension -> matcher builder.
///
/// These are best-effort heuristics. Multi-line signatures, decorators and
/// nested functions can be missed or matched spuriously, and the substring
/// fallback will hit comments and strings that mention the name.
pub struct StrategyTable {
    by_extension: HashMap<&'static str, StrategyBuilder>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        let mut by_extension: HashMap<&'static str, StrategyBuilder> = HashMap::new();
        by_extension.insert("py", def_keyword);
        for ext in ["js", "jsx", "ts", "tsx"] {
            by_extension.insert(ext, brace_and_arrow);
        }
        for ext in ["java", "cs"] {
            by_extension.insert(ext, class_method);
        }
        Self { by_extension }
    }
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher for `function_name` in a file with this path's extension
    pub fn matcher_for(&self, path: &Path, function_name: &str) -> LineMatcher {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match self.by_extension.get(ext.as_str()) {
            Some(build) => build(function_name),
            None => substring(function_name),
        }
    }

    pub fn has_strategy(&self, ext: &str) -> bool {
        self.by_extension.contains_key(ext.to_ascii_lowercase().as_str())
    }
}

fn regex_or_substring(pattern: String, function_name: &str) -> LineMatcher {
    match Regex::new(&pattern) {
        Ok(re) => Box::new(move |line: &str| re.is_match(line)),
        Err(_) => substring(function_name),
    }
}

/// `def name(`
fn def_keyword(function_name: &str) -> LineMatcher {
    let name = regex::escape(function_name);
    regex_or_substring(format!(r"^\s*def\s+{name}\s*\("), function_name)
}

/// `function name(`, `const name =`, or a line starting with `name(`
fn brace_and_arrow(function_name: &str) -> LineMatcher {
    let name = regex::escape(function_name);
    regex_or_substring(
        format!(r"^\s*(function\s+{name}\s*\(|const\s+{name}\s*=|{name}\s*\()"),
        function_name,
    )
}

/// `<type> name(`
fn class_method(function_name: &str) -> LineMatcher {
    let name = regex::escape(function_name);
    match Regex::new(&format!(r"\s+{name}\s*\(")) {
        Ok(re) => Box::new(move |line: &str| re.is_match(line) && line.contains('(')),
        Err(_) => substring(function_name),
    }
}

fn substring(function_name: &str) -> LineMatcher {
    let needle = function_name.to_string();
    Box::new(move |line: &str| line.contains(needle.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(file: &str, name: &str, line: &str) -> bool {
        StrategyTable::new().matcher_for(Path::new(file), name)(line)
    }

    #[test]
    fn test_python_def() {
        assert!(matches("a.py", "handle", "    def handle(self, req):"));
        assert!(matches("a.py", "handle", "def handle ():"));
        assert!(!matches("a.py", "handle", "    self.handle(req)"));
        assert!(!matches("a.py", "handle", "def handle_all():"));
    }

    #[test]
    fn test_js_forms() {
        assert!(matches("a.js", "render", "function render(props) {"));
        assert!(matches("a.tsx", "render", "  const render = () => {"));
        assert!(matches("a.ts", "render", "  render(): void {"));
        assert!(!matches("a.js", "render", "  this.render();"));
    }

    #[test]
    fn test_java_and_csharp_methods() {
        assert!(matches("A.java", "compute", "    public int compute(int x) {"));
        assert!(matches("A.cs", "Compute", "  private static void Compute ()"));
        assert!(!matches("A.java", "compute", "compute(x);"));
    }

    #[test]
    fn test_fallback_is_substring() {
        assert!(matches("calc.cpp", "add", "int add(int a, int b) {"));
        assert!(matches("calc.cpp", "add", "// we add numbers here"));
        assert!(matches("Makefile", "build", "build: all"));
    }

    #[test]
    fn test_special_characters_are_escaped() {
        assert!(matches("a.js", "$get", "function $get() {"));
        assert!(!matches("a.js", "$get", "function xget() {"));
        assert!(matches("a.py", "a.b", "def a.b():"));
        assert!(!matches("a.py", "a.b", "def axb():"));
        assert!(matches("A.java", "op(", "  void op((x)"));
    }
}
