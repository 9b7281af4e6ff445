//! The shared parser is process-wide, so it gets a test binary of its own.

use toolbelt::{
    args::{BaseArgs, arg_parser},
    logger::LogLevel,
};

#[test]
fn test_first_call_wins() {
    let first = arg_parser(Some("first description"), Some("first"));
    let second = arg_parser(Some("second description"), Some("second"));

    assert!(std::ptr::eq(first, second));
    assert_eq!(second.get_name(), "first");
    assert_eq!(
        second.get_about().map(ToString::to_string).as_deref(),
        Some("first description")
    );

    let matches = second
        .clone()
        .try_get_matches_from(["first", "-l", "WARNING", "-e", "foo@bar.com"])
        .unwrap();
    let base = BaseArgs::from_matches(&matches).unwrap();
    assert_eq!(base.log_level, LogLevel::Warning);
    assert_eq!(base.email.as_deref(), Some("foo@bar.com"));
}
