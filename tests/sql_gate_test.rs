//! Integration tests for the SQL admission gate.
//!
//! The gate is purely lexical: none of these tests touch a database.

use osler_mcp::tools::sql_validator::{SqlVerdict, validate_query};

fn rejected_with(sql: &str) -> String {
    let verdict = validate_query(sql);
    assert!(!verdict.is_safe, "expected rejection for: {sql}");
    verdict.reason
}

#[test]
fn test_empty_and_blank_queries() {
    assert_eq!(rejected_with(""), "Empty query");
    assert_eq!(rejected_with("   "), "Empty query");
    assert_eq!(rejected_with("\n\t "), "Empty query");
}

#[test]
fn test_unparsable_query() {
    assert_eq!(rejected_with("SELEC * FROM core.patient"), "Invalid SQL syntax");
    assert_eq!(rejected_with("SELECT * FROM"), "Invalid SQL syntax");
}

#[test]
fn test_stacked_statements_rejected() {
    for sql in [
        "SELECT 1; DROP TABLE core.patient",
        "SELECT * FROM core.patient; SELECT * FROM core.encounter",
        "SELECT 1;SELECT 2",
    ] {
        assert_eq!(rejected_with(sql), "Multiple statements not allowed", "{sql}");
    }
}

#[test]
fn test_non_select_statements_rejected() {
    for sql in [
        "INSERT INTO core.patient (patient_id) VALUES ('x')",
        "UPDATE core.patient SET sex = 'F'",
        "DELETE FROM core.patient",
        "DROP TABLE core.patient",
        "CREATE TABLE t (id INT)",
        "ALTER TABLE core.patient ADD COLUMN c INT",
    ] {
        assert_eq!(rejected_with(sql), "Only SELECT queries allowed", "{sql}");
    }
}

#[test]
fn test_write_keyword_inside_select() {
    let reason = rejected_with("SELECT 'DELETE' AS action FROM core.patient");
    assert_eq!(reason, "Write operation not allowed: DELETE");

    let reason = rejected_with("select replace(name, 'a', 'b') from core.patient");
    assert_eq!(reason, "Write operation not allowed: REPLACE");
}

#[test]
fn test_write_keyword_must_be_whole_word() {
    // "updated_at" and "created_date" contain keywords only as substrings.
    let verdict = validate_query("SELECT updated_at, created_date FROM core.encounter");
    assert!(verdict.is_safe, "{}", verdict.reason);
}

#[test]
fn test_tautology_is_injection() {
    let reason = rejected_with("SELECT * FROM patients WHERE 1=1");
    assert!(
        reason.starts_with("Injection pattern detected:"),
        "got: {reason}"
    );
}

#[test]
fn test_timing_and_file_functions_are_injection() {
    for sql in [
        "SELECT SLEEP(5)",
        "SELECT BENCHMARK(1000000, 1)",
        "SELECT LOAD_FILE('/etc/passwd')",
    ] {
        let reason = rejected_with(sql);
        assert!(reason.starts_with("Injection pattern detected:"), "{sql}: {reason}");
    }
}

#[test]
fn test_sensitive_identifiers_rejected() {
    assert_eq!(
        rejected_with("SELECT password FROM users"),
        "Suspicious identifier detected: PASSWORD (not medical data)"
    );
    let reason = rejected_with("SELECT api_token FROM core.patient");
    assert!(reason.starts_with("Suspicious identifier detected:"), "{reason}");
}

#[test]
fn test_user_id_is_over_blocked() {
    // Known over-blocking of the identifier heuristic.
    let reason = rejected_with("SELECT user_id FROM core.encounter");
    assert_eq!(reason, "Suspicious identifier detected: USER (not medical data)");
}

#[test]
fn test_analytical_queries_are_safe() {
    for sql in [
        "SELECT COUNT(*) FROM core.patient",
        "SELECT AVG(payment_risk_score) FROM cms_hcc.patient_risk_scores",
        "SELECT index_admission_flag, COUNT(*) FROM readmissions.readmission_summary GROUP BY 1",
        "WITH x AS (SELECT patient_id FROM core.patient) SELECT COUNT(*) FROM x",
        "SELECT sex, COUNT(*) AS n FROM core.patient GROUP BY sex ORDER BY n DESC LIMIT 5",
    ] {
        let verdict = validate_query(sql);
        assert_eq!(
            verdict,
            SqlVerdict {
                is_safe: true,
                reason: "Safe".to_string()
            },
            "{sql}"
        );
    }
}

#[test]
fn test_trailing_semicolon_is_one_statement() {
    assert!(validate_query("SELECT COUNT(*) FROM core.patient;").is_safe);
}

#[test]
fn test_validation_is_idempotent() {
    for sql in [
        "",
        "SELECT 1; SELECT 2",
        "SELECT * FROM t WHERE 1=1",
        "SELECT COUNT(*) FROM core.patient",
    ] {
        assert_eq!(validate_query(sql), validate_query(sql));
    }
}
