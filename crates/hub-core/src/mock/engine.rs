//! Mock Engine: candidate evaluation and response synthesis (§4.4).

use regex::Regex;

use super::rule::{MatchType, MockRule, QueryParam};
use crate::flow::ModifiedResponse;

/// Characters that promote a rule's path from an exact-match string to
/// a regular expression (§4.4).
const PATH_REGEX_METACHARS: [char; 4] = ['.', '*', '+', '?'];

/// Outcome of a rule-store lookup: a matching rule, or a miss.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// A rule matched.
    Hit(MockRule),
    /// No enabled rule matched.
    Miss,
}

/// Evaluate a rule's path predicate against a request path.
pub fn match_path(rule_path: &str, request_path: &str) -> bool {
    if rule_path.contains(PATH_REGEX_METACHARS.as_slice()) {
        match Regex::new(rule_path) {
            Ok(re) => re.is_match(request_path),
            // Compile failure: lazily retried on the next match call;
            // this attempt is a non-match (§4.4 "Failure semantics").
            Err(e) => {
                tracing::warn!(pattern = %rule_path, error = %e, "rule path regex failed to compile");
                false
            }
        }
    } else {
        rule_path == request_path
    }
}

/// Evaluate a rule's query-parameter predicates against the request's
/// query parameters. Non-required predicates and extra request
/// parameters are ignored; all required predicates must pass.
pub fn match_query_params(predicates: &[QueryParam], request_params: &[(String, String)]) -> bool {
    predicates
        .iter()
        .filter(|p| p.required)
        .all(|predicate| match_one_query_param(predicate, request_params))
}

fn match_one_query_param(predicate: &QueryParam, request_params: &[(String, String)]) -> bool {
    let Some((_, actual)) = request_params.iter().find(|(k, _)| k == &predicate.key) else {
        return false;
    };

    match predicate.match_type {
        MatchType::Exact => actual == &predicate.value,
        MatchType::Wildcard => true,
        MatchType::Regex => match Regex::new(&predicate.value) {
            Ok(re) => full_match(&re, actual),
            Err(e) => {
                tracing::warn!(pattern = %predicate.value, error = %e, "query param regex failed to compile");
                false
            }
        },
    }
}

/// `Regex::is_match` is a substring search; the spec requires a
/// full-string match.
fn full_match(re: &Regex, text: &str) -> bool {
    re.find(text).map(|m| m.start() == 0 && m.end() == text.len()).unwrap_or(false)
}

/// Synthesise the [`ModifiedResponse`] for a matched rule. The engine
/// never merges with the remote response: all three fields are
/// populated from the rule (§4.4 "Response synthesis").
pub fn synthesize_response(rule: &MockRule) -> ModifiedResponse {
    ModifiedResponse::full(
        rule.response.status_code,
        rule.response.headers.clone(),
        rule.response.body.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_path_requires_equality() {
        assert!(match_path("/v1/u", "/v1/u"));
        assert!(!match_path("/v1/u", "/v1/user"));
    }

    #[test]
    fn path_with_metachar_is_treated_as_regex() {
        assert!(match_path("/v1/u.*", "/v1/users"));
        assert!(!match_path("/v1/u.*", "/v2/users"));
    }

    #[test]
    fn regex_query_param_requires_full_match() {
        let predicate = QueryParam {
            key: "id".into(),
            value: r"\d+".into(),
            required: true,
            match_type: MatchType::Regex,
        };
        assert!(match_one_query_param(&predicate, &[("id".into(), "42".into())]));
        assert!(!match_one_query_param(&predicate, &[("id".into(), "42abc".into())]));
    }

    #[test]
    fn wildcard_query_param_ignores_value() {
        let predicate = QueryParam {
            key: "id".into(),
            value: String::new(),
            required: true,
            match_type: MatchType::Wildcard,
        };
        assert!(match_one_query_param(&predicate, &[("id".into(), "anything".into())]));
        assert!(!match_one_query_param(&predicate, &[]));
    }

    #[test]
    fn non_required_predicates_are_ignored() {
        let predicate = QueryParam {
            key: "trace".into(),
            value: "xyz".into(),
            required: false,
            match_type: MatchType::Exact,
        };
        assert!(match_query_params(std::slice::from_ref(&predicate), &[]));
    }
}
