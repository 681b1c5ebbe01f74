//! Stable diagnostic taxonomy.
//!
//! Codes are versioned by family and never reused:
//! - `E0xx`: one per constraint rule
//! - `I00x`: intent verification
//! - `O00x`: override policy
//! - `S00x`: system failures (parse, I/O, registry)
//! - `SEC00x`: security
//! - `W00x`: advisory warnings

pub const TAXONOMY_VERSION: &str = "1.0.0";

pub const E001_MUST_EXTEND: &str = "E001";
pub const E002_IMPLEMENTS: &str = "E002";
pub const E003_FORBID_IMPORT: &str = "E003";
pub const E004_REQUIRE_IMPORT: &str = "E004";
pub const E005_ALLOW_IMPORT: &str = "E005";
pub const E006_REQUIRE_DECORATOR: &str = "E006";
pub const E007_FORBID_DECORATOR: &str = "E007";
pub const E008_NAMING_PATTERN: &str = "E008";
pub const E009_LOCATION_PATTERN: &str = "E009";
pub const E010_MAX_FILE_LINES: &str = "E010";
pub const E011_MAX_PUBLIC_METHODS: &str = "E011";
pub const E012_REQUIRE_TEST_FILE: &str = "E012";
pub const E013_IMPORTABLE_BY: &str = "E013";
pub const E014_FORBID_CIRCULAR_DEPS: &str = "E014";
pub const E015_FORBID_CALL: &str = "E015";
pub const E016_REQUIRE_CALL: &str = "E016";
pub const E017_REQUIRE_TRY_CATCH: &str = "E017";
pub const E018_REQUIRE_CALL_BEFORE: &str = "E018";
pub const E019_FORBID_MUTATION: &str = "E019";
pub const E020_FORBID_PATTERN: &str = "E020";
pub const E021_REQUIRE_PATTERN: &str = "E021";
pub const E022_ALLOW_PATTERN: &str = "E022";
pub const E023_REQUIRE_ONE_OF: &str = "E023";
pub const E024_MAX_FUNCTION_LINES: &str = "E024";
pub const E025_REQUIRE_EXPORT: &str = "E025";
pub const E026_REQUIRE_COMPANION_FILE: &str = "E026";
pub const E027_REQUIRE_COVERAGE: &str = "E027";
pub const E028_REQUIRE_INTENT: &str = "E028";

pub const I001_UNDEFINED_INTENT: &str = "I001";
pub const I002_INTENT_PATTERN: &str = "I002";
pub const I003_INTENT_CONFLICT: &str = "I003";
pub const I004_MISSING_REQUIRED_INTENT: &str = "I004";

pub const O001_INVALID_SYNTAX: &str = "O001";
pub const O002_MISSING_FIELD: &str = "O002";
pub const O003_EXPIRED: &str = "O003";
pub const O004_EXPIRY_TOO_FAR: &str = "O004";
pub const O005_LIMIT_EXCEEDED: &str = "O005";

pub const S001_PARSE_ERROR: &str = "S001";
pub const S002_FILE_READ: &str = "S002";
pub const S003_INVALID_CONSTRAINT: &str = "S003";
pub const S004_UNKNOWN_RULE: &str = "S004";
pub const S005_INVALID_REGISTRY: &str = "S005";

pub const SEC001_PATH_TRAVERSAL: &str = "SEC001";
pub const SEC002_SANDBOX_VIOLATION: &str = "SEC002";

pub const W001_DEPRECATED_ARCH: &str = "W001";
pub const W002_UNTAGGED_FILE: &str = "W002";
pub const W003_OVERRIDE_NO_EXPIRY: &str = "W003";

/// One-line description for a code, used by reporters.
pub fn describe(code: &str) -> Option<&'static str> {
    let text = match code {
        "E001" => "class must extend the required base",
        "E002" => "class must implement the required interface",
        "E003" => "import is forbidden for this architecture",
        "E004" => "required import is missing",
        "E005" => "invalid allow_import constraint",
        "E006" => "required decorator is missing",
        "E007" => "decorator is forbidden",
        "E008" => "file name does not match the naming pattern",
        "E009" => "file is outside the allowed location",
        "E010" => "file exceeds the line limit",
        "E011" => "class exceeds the public method limit",
        "E012" => "companion test file is missing",
        "E013" => "file is imported by a module that may not import it",
        "E014" => "file participates in a circular dependency",
        "E015" => "call is forbidden",
        "E016" => "required call is missing",
        "E017" => "call must be wrapped in try/catch",
        "E018" => "call must be preceded by a guard call",
        "E019" => "mutation is forbidden",
        "E020" => "forbidden pattern found",
        "E021" => "required pattern not found",
        "E022" => "invalid allow_pattern constraint",
        "E023" => "none of the alternatives is present",
        "E024" => "function exceeds the line limit",
        "E025" => "required export is missing",
        "E026" => "companion file is missing",
        "E027" => "coverage target is missing",
        "E028" => "required intent is missing",
        "I001" => "intent is not defined in the registry",
        "I002" => "intent pattern requirement violated",
        "I003" => "intents conflict",
        "I004" => "intent requires another intent",
        "O001" => "override has invalid syntax",
        "O002" => "override is missing a required field",
        "O003" => "override has expired",
        "O004" => "override expiry is too far in the future",
        "O005" => "too many overrides in one file",
        "S001" => "file could not be parsed",
        "S002" => "file could not be read",
        "S003" => "constraint is malformed",
        "S004" => "no validator registered for rule",
        "S005" => "architecture could not be resolved",
        "SEC001" => "path escapes the project root",
        "SEC002" => "pattern rejected by the regex sandbox",
        "W001" => "architecture is deprecated",
        "W002" => "file has no architecture tag",
        "W003" => "override has no expiry date",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_is_described() {
        for code in [
            E003_FORBID_IMPORT,
            E010_MAX_FILE_LINES,
            I004_MISSING_REQUIRED_INTENT,
            O005_LIMIT_EXCEEDED,
            S005_INVALID_REGISTRY,
            SEC002_SANDBOX_VIOLATION,
            W002_UNTAGGED_FILE,
            W003_OVERRIDE_NO_EXPIRY,
        ] {
            assert!(describe(code).is_some(), "{code} has no description");
        }
        assert!(describe("E999").is_none());
    }
}
