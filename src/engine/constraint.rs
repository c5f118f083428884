use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

pub type Check = Rc<dyn Fn(&JsonValue) -> bool>;

#[derive(Clone)]
pub enum Rule {
    Email,
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Min(f64),
    Max(f64),
    Number,
    Integer,
    OneOf(Vec<JsonValue>),
    MinItems(usize),
    MaxItems(usize),
    Custom { message: String, check: Check },
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Email => write!(f, "Email"),
            Rule::MinLength(n) => write!(f, "MinLength({n})"),
            Rule::MaxLength(n) => write!(f, "MaxLength({n})"),
            Rule::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            Rule::Min(n) => write!(f, "Min({n})"),
            Rule::Max(n) => write!(f, "Max({n})"),
            Rule::Number => write!(f, "Number"),
            Rule::Integer => write!(f, "Integer"),
            Rule::OneOf(v) => write!(f, "OneOf({v:?})"),
            Rule::MinItems(n) => write!(f, "MinItems({n})"),
            Rule::MaxItems(n) => write!(f, "MaxItems({n})"),
            Rule::Custom { message, .. } => write!(f, "Custom({message})"),
        }
    }
}

/// The object a constraint factory produces for one path. An empty
/// constraint accepts anything.
#[derive(Clone, Debug, Default)]
pub struct Constraint {
    pub required: bool,
    pub rules: Vec<Rule>,
    /// Overrides every message this constraint would report.
    pub message: Option<String>,
}

fn email_re() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Null, blank strings and empty arrays count as "nothing entered".
pub fn is_empty_value(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn as_number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn text_len(v: &JsonValue) -> Option<usize> {
    match v {
        JsonValue::String(s) => Some(s.trim().chars().count()),
        _ => None,
    }
}

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn required_if(mut self, cond: bool) -> Self {
        self.required = self.required || cond;
        self
    }

    pub fn email(self) -> Self {
        self.rule(Rule::Email)
    }

    pub fn min_length(self, n: usize) -> Self {
        self.rule(Rule::MinLength(n))
    }

    pub fn max_length(self, n: usize) -> Self {
        self.rule(Rule::MaxLength(n))
    }

    pub fn pattern(self, re: Regex) -> Self {
        self.rule(Rule::Pattern(re))
    }

    pub fn min(self, n: f64) -> Self {
        self.rule(Rule::Min(n))
    }

    pub fn max(self, n: f64) -> Self {
        self.rule(Rule::Max(n))
    }

    pub fn number(self) -> Self {
        self.rule(Rule::Number)
    }

    pub fn integer(self) -> Self {
        self.rule(Rule::Integer)
    }

    pub fn one_of(self, values: Vec<JsonValue>) -> Self {
        self.rule(Rule::OneOf(values))
    }

    pub fn custom(
        self,
        message: impl Into<String>,
        check: impl Fn(&JsonValue) -> bool + 'static,
    ) -> Self {
        self.rule(Rule::Custom {
            message: message.into(),
            check: Rc::new(check),
        })
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.required && self.rules.is_empty()
    }

    /// Intersection of two constraints claimed at the same path: a value must
    /// satisfy both.
    pub fn merge(mut self, other: Constraint) -> Constraint {
        self.required |= other.required;
        self.rules.extend(other.rules);
        if self.message.is_none() {
            self.message = other.message;
        }
        self
    }

    /// First failing rule's message, or `Ok(())`.
    pub fn check(&self, value: &JsonValue) -> Result<(), String> {
        let fail = |msg: String| Err(self.message.clone().unwrap_or(msg));
        if is_empty_value(value) {
            if self.required {
                return fail("This field is required".into());
            }
            // optional and blank: only an item minimum still applies
            for rule in &self.rules {
                if let Rule::MinItems(n) = rule {
                    if *n > 0 {
                        return fail(format!("At least {n} item(s) required"));
                    }
                }
            }
            return Ok(());
        }
        for rule in &self.rules {
            match rule {
                Rule::Email => {
                    let ok = match (value.as_str(), email_re()) {
                        (Some(s), Some(re)) => re.is_match(s.trim()),
                        _ => false,
                    };
                    if !ok {
                        return fail("Invalid email".into());
                    }
                }
                Rule::MinLength(n) => {
                    if text_len(value).is_some_and(|l| l < *n) {
                        return fail(format!("Must be at least {n} characters"));
                    }
                }
                Rule::MaxLength(n) => {
                    if text_len(value).is_some_and(|l| l > *n) {
                        return fail(format!("Must be at most {n} characters"));
                    }
                }
                Rule::Pattern(re) => {
                    let ok = match value {
                        JsonValue::String(s) => re.is_match(s.trim()),
                        other => re.is_match(&other.to_string()),
                    };
                    if !ok {
                        return fail("Does not match required pattern".into());
                    }
                }
                Rule::Min(m) => match as_number(value) {
                    Some(v) if v < *m => return fail(format!("Must be at least {m}")),
                    None => return fail("Invalid number".into()),
                    _ => {}
                },
                Rule::Max(m) => match as_number(value) {
                    Some(v) if v > *m => return fail(format!("Must be at most {m}")),
                    None => return fail("Invalid number".into()),
                    _ => {}
                },
                Rule::Number => {
                    if as_number(value).is_none() {
                        return fail("Invalid number".into());
                    }
                }
                Rule::Integer => {
                    if !as_number(value).is_some_and(|v| v.fract() == 0.0) {
                        return fail("Invalid integer".into());
                    }
                }
                Rule::OneOf(allowed) => {
                    let hit = allowed.iter().any(|a| {
                        a == value || (a.as_str().is_some() && a.as_str() == value.as_str())
                    });
                    if !hit {
                        return fail("Not an allowed option".into());
                    }
                }
                Rule::MinItems(n) => {
                    let len = value.as_array().map(|a| a.len()).unwrap_or(0);
                    if len < *n {
                        return fail(format!("At least {n} item(s) required"));
                    }
                }
                Rule::MaxItems(n) => {
                    let len = value.as_array().map(|a| a.len()).unwrap_or(0);
                    if len > *n {
                        return fail(format!("At most {n} item(s) allowed"));
                    }
                }
                Rule::Custom { message, check } => {
                    if !check(value) {
                        return fail(message.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_rejects_blank_values() {
        let c = Constraint::new().required();
        assert_eq!(c.check(&json!("  ")).unwrap_err(), "This field is required");
        assert!(c.check(&json!([])).is_err());
        assert!(c.check(&JsonValue::Null).is_err());
        assert!(c.check(&json!("x")).is_ok());
        // false is a value, not an absence
        assert!(c.check(&json!(false)).is_ok());
    }

    #[test]
    fn optional_blank_skips_rules() {
        let c = Constraint::new().email().min_length(3);
        assert!(c.check(&json!("")).is_ok());
        assert_eq!(c.check(&json!("not-an-email")).unwrap_err(), "Invalid email");
        assert!(c.check(&json!("a@b.io")).is_ok());
    }

    #[test]
    fn numeric_rules_accept_numbers_and_numeric_strings() {
        let c = Constraint::new().integer().min(1.0).max(10.0);
        assert!(c.check(&json!(5)).is_ok());
        assert!(c.check(&json!("7")).is_ok());
        assert_eq!(c.check(&json!(2.5)).unwrap_err(), "Invalid integer");
        assert_eq!(c.check(&json!(0)).unwrap_err(), "Must be at least 1");
        assert_eq!(c.check(&json!("11")).unwrap_err(), "Must be at most 10");
        assert_eq!(
            Constraint::new().number().check(&json!("abc")).unwrap_err(),
            "Invalid number"
        );
    }

    #[test]
    fn merge_intersects_and_keeps_first_message() {
        let a = Constraint::new().min_length(2);
        let b = Constraint::new().required().max_length(4).message("bad");
        let m = a.merge(b);
        assert!(m.required);
        assert_eq!(m.rules.len(), 2);
        assert_eq!(m.check(&json!("toolong")).unwrap_err(), "bad");
    }

    #[test]
    fn pattern_one_of_and_custom() {
        let re = Regex::new(r"^[A-Z]{3}$").unwrap();
        let c = Constraint::new().pattern(re);
        assert!(c.check(&json!("ABC")).is_ok());
        assert_eq!(
            c.check(&json!("abc")).unwrap_err(),
            "Does not match required pattern"
        );
        let c = Constraint::new().one_of(vec![json!("a"), json!("b")]);
        assert!(c.check(&json!("b")).is_ok());
        assert!(c.check(&json!("z")).is_err());
        let c = Constraint::new().custom("must be even", |v| v.as_i64().is_some_and(|n| n % 2 == 0));
        assert_eq!(c.check(&json!(3)).unwrap_err(), "must be even");
    }

    #[test]
    fn item_counts_apply_to_arrays() {
        let c = Constraint::new()
            .rule(Rule::MinItems(1))
            .rule(Rule::MaxItems(2));
        assert!(c.check(&json!([1])).is_ok());
        assert_eq!(c.check(&json!([1, 2, 3])).unwrap_err(), "At most 2 item(s) allowed");
    }
}
