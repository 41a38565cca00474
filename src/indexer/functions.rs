//! Call and definition extraction over parsed MeTTa trees.
//!
//! Feeds the dependency resolver: calls made by a chunk are matched against
//! the definitions of other chunks in the same scope.
use std::collections::BTreeSet;

use tracing::warn;

use super::syntax::{self, NodeKind, ParseError, SyntaxNode};

/// Extracted function names. Ordered so callers get deterministic iteration.
pub type NameSet = BTreeSet<String>;

/// Language built-ins never tracked as custom dependencies.
///
/// Kept sorted by byte order; membership is a binary search.
pub static BUILTIN_FUNCTIONS: &[&str] = &[
    "!",
    "!=",
    "*",
    "+",
    "-",
    "->",
    "/",
    "//",
    ":",
    "<",
    "<=",
    "=",
    "==",
    ">",
    ">=",
    "Error",
    "False",
    "True",
    "add-atom",
    "and",
    "assertEqual",
    "bind!",
    "car",
    "case",
    "cdr",
    "chain",
    "collapse",
    "cons",
    "empty",
    "filter",
    "foldl",
    "foldr",
    "get-atoms",
    "get-metatype",
    "get-type",
    "if",
    "import!",
    "let",
    "let*",
    "map",
    "match",
    "mod",
    "not",
    "or",
    "pragma!",
    "remove-atom",
    "superpose",
    "unify",
    "zip",
];

pub fn is_builtin_function(name: &str) -> bool {
    BUILTIN_FUNCTIONS.binary_search(&name).is_ok()
}

/// Collect the head names of every call or expression group, at any depth,
/// minus built-ins.
pub fn collect_calls(forest: &[SyntaxNode]) -> NameSet {
    let mut calls = NameSet::new();
    let mut stack: Vec<&SyntaxNode> = forest.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if matches!(node.kind, NodeKind::CallGroup | NodeKind::ExpressionGroup) {
            if let Some(name) = node.head_word() {
                calls.insert(name.to_string());
            }
        }
        stack.extend(node.children.iter().rev());
    }

    calls.retain(|name| !is_builtin_function(name));
    calls
}

/// Name defined by a rule: the first word inside its first expression group.
///
/// `(= (factorial $n) ...)` defines `factorial`. Rules of any other shape
/// define nothing, and neither does a variable head such as `(= ($f $x) ...)`:
/// calls never name a variable, so recording one could never match.
pub fn rule_name(rule: &SyntaxNode) -> Option<&str> {
    if rule.kind != NodeKind::RuleGroup {
        return None;
    }
    rule.children
        .iter()
        .find(|child| child.kind == NodeKind::ExpressionGroup)?
        .children
        .iter()
        .find(|inner| inner.kind == NodeKind::WordToken)?
        .word()
}

/// Collect names defined by top-level rules.
pub fn collect_definitions(forest: &[SyntaxNode]) -> NameSet {
    forest
        .iter()
        .filter_map(rule_name)
        .map(str::to_string)
        .collect()
}

pub fn try_extract_function_calls(code: &str) -> Result<NameSet, ParseError> {
    syntax::parse(code).map(|forest| collect_calls(&forest))
}

pub fn try_extract_function_definitions(code: &str) -> Result<NameSet, ParseError> {
    syntax::parse(code).map(|forest| collect_definitions(&forest))
}

/// Custom functions called by `code`. Unparseable code calls nothing.
pub fn extract_function_calls(code: &str) -> NameSet {
    try_extract_function_calls(code).unwrap_or_else(|e| {
        warn!("Failed to parse code for function calls: {e}");
        NameSet::new()
    })
}

/// Functions defined by `code`. Unparseable code defines nothing.
pub fn extract_function_definitions(code: &str) -> NameSet {
    try_extract_function_definitions(code).unwrap_or_else(|e| {
        warn!("Failed to parse code for function definitions: {e}");
        NameSet::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> NameSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_table_sorted() {
        for pair in BUILTIN_FUNCTIONS.windows(2) {
            assert!(pair[0] < pair[1], "{:?} out of order", pair);
        }
        assert!(is_builtin_function("let*"));
        assert!(is_builtin_function("import!"));
        assert!(!is_builtin_function("factorial"));
    }

    #[test]
    fn test_only_builtins_yields_nothing() {
        let code = "(if (and (> $x 0) (not (== $x 5))) (+ $x 1) (let $y (car $l) (cons $y ())))";
        assert!(extract_function_calls(code).is_empty());
    }

    #[test]
    fn test_definition_shape() {
        let defs = extract_function_definitions("(= (factorial $n) (* $n (factorial (- $n 1))))");
        assert_eq!(defs, names(&["factorial"]));
    }

    #[test]
    fn test_nested_calls() {
        let calls = extract_function_calls("(foo (bar (baz $x)))");
        assert_eq!(calls, names(&["bar", "baz", "foo"]));
    }

    #[test]
    fn test_variable_heads_excluded() {
        let calls = extract_function_calls("($f 1 2)");
        assert!(calls.is_empty());
        assert!(!calls.contains("$f"));
    }

    #[test]
    fn test_only_head_position_counts() {
        // `helper` is an argument here, not a call
        let calls = extract_function_calls("(apply-twice helper 3)");
        assert_eq!(calls, names(&["apply-twice"]));
    }

    #[test]
    fn test_rule_head_counts_as_call() {
        let calls = extract_function_calls("(= (main) (helper 1))");
        assert_eq!(calls, names(&["helper", "main"]));
    }

    #[test]
    fn test_malformed_input_is_empty() {
        assert!(extract_function_calls("(foo (bar").is_empty());
        assert!(extract_function_definitions("(= (foo) (bar)))").is_empty());
        assert!(try_extract_function_calls("(foo (bar").is_err());
    }

    #[test]
    fn test_definitions_top_level_only() {
        let code = r#"
            (= (double $x) (* 2 $x))
            (= (square $x) (* $x $x))
            (: double (-> Number Number))
            (outer (= (hidden) 1))
            (= constant 42)
        "#;
        assert_eq!(
            extract_function_definitions(code),
            names(&["double", "square"])
        );
    }

    #[test]
    fn test_variable_rule_head_defines_nothing() {
        assert!(extract_function_definitions("(= ($f $x) $x)").is_empty());
    }

    #[test]
    fn test_deeply_nested_code() {
        let depth = 100_000;
        let code = format!("{}$x{}", "(step ".repeat(depth), ")".repeat(depth));
        assert_eq!(extract_function_calls(&code), names(&["step"]));

        let rule = format!("(= (deep) {}1{})", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(extract_function_definitions(&rule), names(&["deep"]));
    }

    #[test]
    fn test_type_declarations_not_calls() {
        let calls = extract_function_calls("(: double (-> Number Number))");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let code = "(= (run) (zeta (alpha (mid 1))))";
        let a: Vec<String> = extract_function_calls(code).into_iter().collect();
        let b: Vec<String> = extract_function_calls(code).into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a, vec!["alpha", "mid", "run", "zeta"]);
    }
}
