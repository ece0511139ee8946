use super::*;

#[test]
fn defaults_without_any_block() {
    let p = ParsedInput::from_str("").expect("empty input parses");
    assert_eq!(p.int("general", "startframe"), 1);
    assert_eq!(p.int("general", "endframe"), 9999999);
    assert_eq!(p.int("gb", "igb"), 5);
    assert!(p.triggered.is_empty());
}

#[test]
fn basic_assignments_and_triggers() {
    let text = "\
&general
  startframe = 5, endframe = 20,
  interval = 2
/
&gb
  igb = 2
  saltcon = 0.15
/
";
    let p = ParsedInput::from_str(text).unwrap();
    assert_eq!(p.int("general", "startframe"), 5);
    assert_eq!(p.int("general", "endframe"), 20);
    assert_eq!(p.int("general", "interval"), 2);
    assert_eq!(p.int("gb", "igb"), 2);
    assert!((p.float("gb", "saltcon") - 0.15).abs() < 1e-12);
    assert!(p.triggered.contains("general"));
    assert!(p.triggered.contains("gb"));
    assert!(!p.triggered.contains("pb"));
}

#[test]
fn comments_and_title_lines_are_ignored() {
    let text = "\
Input file for a GB run
# a comment
&general
! another comment
  startframe = 3
/
trailing junk outside any block
";
    let p = ParsedInput::from_str(text).unwrap();
    assert_eq!(p.int("general", "startframe"), 3);
}

#[test]
fn prefix_abbreviation_binds_to_canonical_name() {
    let p = ParsedInput::from_str("&general\n endfra = 50\n/\n").unwrap();
    assert_eq!(p.int("general", "endframe"), 50);
    // four characters is enough when no other key shares the prefix
    let p = ParsedInput::from_str("&general\n endf = 50\n/\n").unwrap();
    assert_eq!(p.int("general", "endframe"), 50);
}

#[test]
fn short_canonical_names_still_match_exactly() {
    let p = ParsedInput::from_str("&gb\n igb = 8\n/\n").unwrap();
    assert_eq!(p.int("gb", "igb"), 8);
    let p = ParsedInput::from_str("&pb\n inp = 1\n/\n").unwrap();
    assert_eq!(p.int("pb", "inp"), 1);
}

#[test]
fn ambiguous_prefix_is_rejected() {
    // "inte" is a prefix of both interval and interaction_entropy
    let err = ParsedInput::from_str("&general\n inte = 2\n/\n").unwrap_err();
    assert!(matches!(err, InputError::AmbiguousPrefix { .. }), "{err:?}");
    // one more character in the right direction resolves it
    let p = ParsedInput::from_str("&general\n interv = 2\n/\n").unwrap();
    assert_eq!(p.int("general", "interval"), 2);
}

#[test]
fn unknown_variable_reports_token_and_namespace() {
    let err = ParsedInput::from_str("&gb\n flerb = 1\n/\n").unwrap_err();
    assert_eq!(
        err,
        InputError::UnknownVariable {
            namespace: "gb".to_string(),
            token: "flerb".to_string(),
        }
    );
}

#[test]
fn duplicate_variable_is_fatal() {
    let err = ParsedInput::from_str("&general\n startframe = 1\n startfra = 2\n/\n").unwrap_err();
    assert!(matches!(err, InputError::DuplicateVariable { .. }), "{err:?}");
}

#[test]
fn duplicate_namespace_is_fatal() {
    let err = ParsedInput::from_str("&gb\n/\n&gb\n/\n").unwrap_err();
    assert_eq!(err, InputError::DuplicateNamespace("gb".to_string()));
}

#[test]
fn nested_namespace_start_is_fatal() {
    let err = ParsedInput::from_str("&general\n&gb\n/\n").unwrap_err();
    assert_eq!(err, InputError::UnterminatedNamespace);
}

#[test]
fn amp_end_terminator() {
    let p = ParsedInput::from_str("&general\n startframe = 7\n&end\n").unwrap();
    assert_eq!(p.int("general", "startframe"), 7);
}

#[test]
fn type_mismatch_is_reported() {
    let err = ParsedInput::from_str("&general\n startframe = soon\n/\n").unwrap_err();
    assert!(matches!(err, InputError::TypeMismatch { .. }), "{err:?}");
    // a float value cannot silently truncate into an integer variable
    let err = ParsedInput::from_str("&general\n startframe = 1.5\n/\n").unwrap_err();
    assert!(matches!(err, InputError::TypeMismatch { .. }), "{err:?}");
}

#[test]
fn integers_widen_into_float_variables() {
    let p = ParsedInput::from_str("&pb\n indi = 2\n/\n").unwrap();
    assert!((p.float("pb", "indi") - 2.0).abs() < 1e-12);
}

#[test]
fn strings_lose_their_quotes() {
    let p = ParsedInput::from_str("&ala\n mutant_res = \"A/35\"\n/\n").unwrap();
    assert_eq!(p.string("ala", "mutant_res"), "A/35");
}

#[test]
fn list_values_span_commas_and_lines() {
    let text = "\
&general
  forcefields = oldff/leaprc.ff99SB, leaprc.gaff,
                leaprc.water.tip3p
/
";
    let p = ParsedInput::from_str(text).unwrap();
    assert_eq!(
        p.list("general", "forcefields"),
        vec![
            "oldff/leaprc.ff99SB".to_string(),
            "leaprc.gaff".to_string(),
            "leaprc.water.tip3p".to_string(),
        ]
    );
}

#[test]
fn numeric_list_split_keeps_grid_triples_together() {
    assert_eq!(split_list("\"1,2,3\""), vec!["1,2,3".to_string()]);
    assert_eq!(
        split_list("a, b; c"),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert_eq!(
        split_list("leaprc.gaff, 1,2,3"),
        vec!["leaprc.gaff".to_string(), "1,2,3".to_string()]
    );
    // a digit on either side of the delimiter suppresses the split, so
    // negative grid triples survive too
    assert_eq!(split_list("-1,-1,-1"), vec!["-1,-1,-1".to_string()]);
    assert_eq!(split_list("grid4,fine"), vec!["grid4,fine".to_string()]);
}

#[test]
fn continuation_without_assignment_is_fatal() {
    let err = ParsedInput::from_str("&general\n orphan-value\n/\n").unwrap_err();
    assert_eq!(err, InputError::StrayField("general".to_string()));
}

#[test]
fn missing_file_is_reported() {
    let err = ParsedInput::from_file("/definitely/not/here.in").unwrap_err();
    assert!(matches!(err, InputError::FileNotFound(_)));
}

#[test]
fn serialize_round_trips_every_recognized_variable() {
    let text = "\
&general
  startfra = 2, endfra = 40, interval = 2,
  temperat = 300.0
/
&gb
  igb = 2, saltcon = 0.1
/
&alanine_scanning
  mutant = ALA, mutant_res = \"A/35\"
/
";
    let first = ParsedInput::from_str(text).unwrap();
    let echoed = first.serialize();
    let second = ParsedInput::from_str(&echoed).unwrap();
    assert_eq!(first.triggered, second.triggered);
    for ns in first.spec().namespaces.iter() {
        for var in &ns.vars {
            assert_eq!(
                first.value(ns.key, var.name),
                second.value(ns.key, var.name),
                "{}.{} drifted through the round trip",
                ns.key,
                var.name
            );
        }
    }
}
