// Executor behavior against an in-memory page: candidate order, retries,
// checkbox idempotence, dropdown verification and navigation recovery

use pretty_assertions::assert_eq;

mod common;
use common::{Effect, FakeElement, FakePage, fast_execution};

use webassist::config::{ExecutionSettings, RecoveryTarget, default_recovery_targets};
use webassist::{Action, ActionExecutor, ActionKind, ErrorKind, InteractionResult, SelectorTables};

async fn run(page: &FakePage, action: &Action) -> InteractionResult {
    run_with(page, action, &fast_execution(), &default_recovery_targets()).await
}

async fn run_with(
    page: &FakePage,
    action: &Action,
    settings: &ExecutionSettings,
    recovery: &[RecoveryTarget],
) -> InteractionResult {
    let tables = SelectorTables::default();
    ActionExecutor::new(page, settings, recovery, &tables)
        .execute(action)
        .await
}

fn state_dropdown(label_updates: bool) -> FakePage {
    let mut california = FakeElement::new("california", "li")
        .matching(&[".p-dropdown-item"])
        .text("California")
        .hidden();
    if label_updates {
        california = california
            .on_click(Effect::SetText("trigger".into(), "California".into()))
            .on_click(Effect::Hide("panel".into()));
    }

    FakePage::new(vec![
        FakeElement::new("trigger", "div")
            .matching(&[".p-dropdown"])
            .text("Select State")
            .popup()
            .on_click(Effect::Show("panel".into()))
            .on_click(Effect::Show("filter".into()))
            .on_click(Effect::Show("alabama".into()))
            .on_click(Effect::Show("california".into())),
        FakeElement::new("panel", "div")
            .matching(&[".p-dropdown-panel"])
            .hidden(),
        FakeElement::new("filter", "input")
            .matching(&[".p-dropdown-filter"])
            .input("text")
            .hidden(),
        FakeElement::new("alabama", "li")
            .matching(&[".p-dropdown-item"])
            .text("Alabama")
            .hidden(),
        california,
    ])
}

fn select_state(value: &str) -> Action {
    Action::new(ActionKind::Select, "state dropdown")
        .with_selector(r#".p-dropdown:has-text("Select State")"#)
        .with_value(value)
}

#[tokio::test]
async fn test_first_matching_candidate_wins() {
    let page = FakePage::new(vec![
        FakeElement::new("second", "button").matching(&["#second"]),
        FakeElement::new("third", "button").matching(&["#third"]),
    ]);
    let action = Action::new(ActionKind::Click, "login button")
        .with_selector("#missing")
        .with_fallbacks(["#second", "#third"]);

    let result = run(&page, &action).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Clicked login button");
    assert_eq!(page.clicks_on("#second"), 1);
    assert!(!page.calls().iter().any(|c| c.contains("#third")));

    let attempts = result.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!((attempts[0].matched, attempts[0].attempts), (0, 0));
    assert!(attempts[1].succeeded);
}

#[tokio::test]
async fn test_already_checked_box_is_not_clicked() {
    let page = FakePage::new(vec![
        FakeElement::new("terms", "input")
            .matching(&["#terms"])
            .input("checkbox")
            .checked(true),
    ]);
    let action = Action::new(ActionKind::Check, "terms checkbox").with_selector("#terms");

    let result = run(&page, &action).await;

    assert!(result.success);
    assert_eq!(result.message, "terms checkbox already checked");
    assert_eq!(page.clicks_on("#terms"), 0);
    assert!(page.element("terms").checked);
}

#[tokio::test]
async fn test_check_and_toggle_flip_state() {
    let page = FakePage::new(vec![
        FakeElement::new("news", "input")
            .matching(&["#news"])
            .input("checkbox"),
    ]);

    let check = Action::new(ActionKind::Check, "newsletter checkbox").with_selector("#news");
    let result = run(&page, &check).await;
    assert_eq!(result.message, "newsletter checkbox is now checked");
    assert!(page.element("news").checked);

    let toggle = Action::new(ActionKind::Toggle, "newsletter checkbox").with_selector("#news");
    let result = run(&page, &toggle).await;
    assert_eq!(result.message, "newsletter checkbox is now unchecked");
    assert!(!page.element("news").checked);
    assert_eq!(page.clicks_on("#news"), 2);
}

#[tokio::test]
async fn test_checkbox_that_ignores_clicks_fails_verification() {
    let page = FakePage::new(vec![
        FakeElement::new("terms", "input")
            .matching(&["#terms"])
            .input("checkbox")
            .frozen(),
    ]);
    let action = Action::new(ActionKind::Check, "terms checkbox").with_selector("#terms");

    let result = run(&page, &action).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::VerificationFailed));
    assert_eq!(result.message, "Could not confirm terms checkbox");
}

#[tokio::test]
async fn test_retries_are_bounded_per_selector() {
    let page = FakePage::new(vec![
        FakeElement::new("broken", "button").matching(&["#broken"]).broken(),
        FakeElement::new("ok", "button").matching(&["#ok"]),
    ]);
    let action = Action::new(ActionKind::Click, "submit button")
        .with_selector("#broken")
        .with_fallbacks(["#ok"]);

    let result = run(&page, &action).await;

    assert!(result.success);
    assert_eq!(page.clicks_on("#broken"), 3);
    assert_eq!(page.clicks_on("#ok"), 1);
    assert_eq!(result.attempts()[0].attempts, 3);
    assert!(result.attempts()[0].error.is_some());
}

#[tokio::test]
async fn test_retry_count_follows_settings() {
    let page = FakePage::new(vec![
        FakeElement::new("broken", "button").matching(&["#broken"]).broken(),
    ]);
    let action = Action::new(ActionKind::Click, "submit button").with_selector("#broken");
    let settings = ExecutionSettings {
        max_retries: 5,
        ..fast_execution()
    };

    let result = run_with(&page, &action, &settings, &[]).await;

    assert_eq!(page.clicks_on("#broken"), 5);
    assert_eq!(result.error_kind(), Some(ErrorKind::ActionFailed));
    assert_eq!(result.message, "Could not find element to submit button");
    assert!(result.details.as_ref().is_some_and(|d| d.cause.is_some()));
}

#[tokio::test]
async fn test_flaky_click_succeeds_on_retry() {
    let page = FakePage::new(vec![
        FakeElement::new("flaky", "button")
            .matching(&["#flaky"])
            .failing_clicks(2),
    ]);
    let action = Action::new(ActionKind::Click, "next button").with_selector("#flaky");

    let result = run(&page, &action).await;

    assert!(result.success);
    assert_eq!(page.clicks_on("#flaky"), 3);
    assert_eq!(result.attempts()[0].attempts, 3);
}

#[tokio::test]
async fn test_type_falls_back_to_email_input() {
    let page = FakePage::new(vec![
        FakeElement::new("email", "input")
            .matching(&["input[type=email]"])
            .input("email"),
    ]);
    let action = Action::new(ActionKind::Type, "email field")
        .with_selector("#missing")
        .with_fallbacks(["input[type=email]"])
        .with_value("a@b.com");

    let result = run(&page, &action).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Entered email field");
    assert_eq!(page.element("email").value, "a@b.com");
}

#[tokio::test]
async fn test_typed_value_is_read_back() {
    let page = FakePage::new(vec![
        FakeElement::new("masked", "input")
            .matching(&["#masked"])
            .frozen(),
    ]);
    let action = Action::new(ActionKind::Type, "phone field")
        .with_selector("#masked")
        .with_value("555-0100");

    let result = run(&page, &action).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::VerificationFailed));

    let settings = ExecutionSettings {
        verify_typed_values: false,
        ..fast_execution()
    };
    let result = run_with(&page, &action, &settings, &[]).await;
    assert!(result.success);
}

#[tokio::test]
async fn test_empty_selectors_fail_without_touching_page() {
    let page = FakePage::new(vec![FakeElement::new("any", "button")]);
    let action = Action::new(ActionKind::Click, "mystery button").with_selector("  ");

    let result = run(&page, &action).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::NoSelector));
    assert!(page.calls().is_empty());
}

#[tokio::test]
async fn test_nothing_matches_is_element_not_found() {
    let page = FakePage::new(vec![]);
    let action = Action::new(ActionKind::Click, "pricing link")
        .with_selector("#pricing")
        .with_fallbacks([r#"a:has-text("Pricing")"#]);

    let result = run(&page, &action).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ElementNotFound));
    assert_eq!(result.message, "Could not find element to pricing link");
    assert_eq!(result.attempts().len(), 2);
}

#[tokio::test]
async fn test_custom_dropdown_selects_and_verifies() {
    let page = state_dropdown(true);

    let result = run(&page, &select_state("California")).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Selected California from state dropdown");
    assert_eq!(page.element("trigger").text, "California");
    // The filter box received the value before options were matched
    assert!(page.calls().iter().any(|c| c == "fill .p-dropdown-filter #0"));
}

#[tokio::test]
async fn test_dropdown_label_unchanged_is_verification_failure() {
    let page = state_dropdown(false);

    let result = run(&page, &select_state("California")).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::VerificationFailed));
    assert_eq!(result.message, "Could not confirm state dropdown");
}

#[tokio::test]
async fn test_dropdown_without_option_is_not_found() {
    let page = state_dropdown(true);

    let result = run(&page, &select_state("Texas")).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ElementNotFound));
}

#[tokio::test]
async fn test_dropdown_retry_does_not_close_open_panel() {
    let page = FakePage::new(vec![
        FakeElement::new("trigger", "div")
            .matching(&[".p-dropdown"])
            .text("Select State")
            .on_click(Effect::Toggle("panel".into()))
            .on_click(Effect::Show("alabama".into())),
        FakeElement::new("panel", "div")
            .matching(&[".p-dropdown-panel"])
            .hidden(),
        FakeElement::new("alabama", "li")
            .matching(&[".p-dropdown-item"])
            .text("Alabama")
            .hidden(),
    ]);

    let result = run(&page, &select_state("Texas")).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ElementNotFound));
    assert!(page.element("panel").visible);
    let trigger_clicks = page
        .calls()
        .iter()
        .filter(|c| c.starts_with("click [data-webassist-pin"))
        .count();
    assert_eq!(trigger_clicks, 1);
}

#[tokio::test]
async fn test_dropdown_panel_that_never_opens_times_out() {
    let page = FakePage::new(vec![
        FakeElement::new("trigger", "div")
            .matching(&[".p-dropdown"])
            .text("Select State"),
        FakeElement::new("panel", "div")
            .matching(&[".p-dropdown-panel"])
            .hidden(),
    ]);

    let result = run(&page, &select_state("California")).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::NavigationTimeout));
}

#[tokio::test]
async fn test_native_select_uses_option_list() {
    let page = FakePage::new(vec![
        FakeElement::new("state", "select")
            .matching(&[r#"select[name*="state" i]"#])
            .options(&["", "Alabama", "California"]),
    ]);
    let action = Action::new(ActionKind::Select, "state dropdown")
        .with_selector(r#"select[name*="state" i]"#)
        .with_value("calif");

    let result = run(&page, &action).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Selected California from state dropdown");
    assert_eq!(page.element("state").selected, Some(2));
}

#[tokio::test]
async fn test_positional_candidate_targets_nth_match() {
    let page = FakePage::new(vec![
        FakeElement::new("country", "div").matching(&[".p-dropdown"]),
        FakeElement::new("state", "div").matching(&[".p-dropdown"]),
    ]);
    let action = Action::new(ActionKind::Click, "state dropdown")
        .with_selector("#state")
        .with_fallbacks([".p-dropdown >> nth=1"]);

    let result = run(&page, &action).await;

    assert!(result.success);
    assert!(page.calls().iter().any(|c| c == "click .p-dropdown #1"));

    // Not enough matches for the position: skipped without attempts
    let action = Action::new(ActionKind::Click, "third dropdown").with_selector(".p-dropdown >> nth=2");
    let result = run(&page, &action).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ElementNotFound));
}

#[tokio::test]
async fn test_navigation_normalizes_url() {
    let page = FakePage::new(vec![]);
    let action = Action::new(ActionKind::Navigate, "requested page").with_value("example.org");

    let result = run(&page, &action).await;

    assert!(result.success);
    assert_eq!(result.message, "Navigated to https://example.org");
    assert_eq!(page.url(), "https://example.org");
}

#[tokio::test]
async fn test_invalid_url_is_rejected_without_loading() {
    let page = FakePage::new(vec![]);
    let action = Action::new(ActionKind::Navigate, "requested page").with_value("https://");

    let result = run_with(&page, &action, &fast_execution(), &[]).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidUrl));
    assert!(page.calls().is_empty());
}

#[tokio::test]
async fn test_failed_signin_navigation_recovers() {
    let page = FakePage::new(vec![]).unreachable("https://signin.invalid");
    let action = Action::new(ActionKind::Navigate, "requested page").with_value("signin.invalid");

    let result = run(&page, &action).await;

    assert!(result.success, "{result:?}");
    assert_eq!(page.url(), "https://www.redberyltest.in/#/signin");
    assert_eq!(
        page.calls(),
        vec![
            "goto https://signin.invalid".to_string(),
            "goto https://www.redberyltest.in/#/signin".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_slow_navigation_times_out() {
    let page = FakePage::new(vec![]).slow("https://slow.example");
    let action = Action::new(ActionKind::Navigate, "requested page").with_value("slow.example");

    let result = run(&page, &action).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::NavigationTimeout));
    assert_eq!(result.message, "Timed out loading slow.example");
}

#[tokio::test]
async fn test_lost_session_is_reported() {
    let page = FakePage::new(vec![FakeElement::new("btn", "button").matching(&["#go"])]);
    page.lose_session();
    let action = Action::new(ActionKind::Click, "go button")
        .with_selector("#go")
        .with_fallbacks(["#other"]);

    let result = run(&page, &action).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::SessionLost));
    assert_eq!(result.message, "Lost connection to the browser");
    // Aborted at the first candidate
    assert_eq!(page.calls(), vec!["count #go".to_string()]);
}

#[tokio::test]
async fn test_wait_action() {
    let page = FakePage::new(vec![]);
    let action = Action::new(ActionKind::Wait, "page to settle").with_value("10");

    let result = run(&page, &action).await;

    assert!(result.success);
    assert_eq!(result.message, "Waited 10 ms");
    assert!(page.calls().is_empty());
}
