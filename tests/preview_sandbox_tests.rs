//! Render cycle tests against the public sandbox API
//!
//! Each test boots real V8 isolates through `PreviewSandbox`.

use pretty_assertions::assert_eq;
use std::time::Duration;

use preview_sandbox::app::preview::{
    PreviewError, PreviewEvent, PreviewSandbox, PreviewState, RegionContent, RenderOutcome,
    RuntimePhase, TsxTransform,
};
use preview_sandbox::app::v8_bindings::{
    initialize_v8_platform, Capability, CapabilitySet, RuntimeConfig,
};

fn sandbox() -> PreviewSandbox {
    initialize_v8_platform().unwrap();
    PreviewSandbox::new()
}

fn runtime_error(outcome: &RenderOutcome) -> (String, RuntimePhase) {
    match outcome {
        RenderOutcome::Errored(PreviewError::Runtime { message, phase, .. }) => {
            (message.clone(), *phase)
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

const COUNTER: &str = r#"
import React, { useState } from 'react';

interface Props { start?: number }

export default function PreviewComponent({ start = 0 }: Props) {
  const [count, setCount] = useState<number>(start);
  return (
    <div className="counter">
      <span>Count: {count}</span>
      <button onClick={() => setCount((c) => c + 1)}>Add</button>
    </div>
  );
}
"#;

#[test]
fn test_null_component_displays_empty_region() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render("export default function PreviewComponent() { return null; }");
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().content(), &RegionContent::View(Vec::new()));
    assert_eq!(sandbox.region().text_content(), "");
}

#[test]
fn test_throwing_component_is_contained() {
    let mut sandbox = sandbox();
    let outcome =
        sandbox.render("export default function PreviewComponent() { throw new Error('boom'); }");
    let (message, phase) = runtime_error(&outcome);
    assert!(message.contains("boom"), "{}", message);
    assert_eq!(phase, RuntimePhase::Mount);
    assert_eq!(sandbox.state(), PreviewState::Errored);
    assert!(sandbox.region().to_html().contains("Preview Error:"));
    assert!(sandbox.region().to_html().contains("boom"));
}

#[test]
fn test_unbalanced_braces_report_transform_error_and_host_stays_usable() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render("export default function PreviewComponent() { return (<div>{</div>; ");
    match &outcome {
        RenderOutcome::Errored(PreviewError::Transform(err)) => assert!(err.location.is_some()),
        other => panic!("expected a transform error, got {:?}", other),
    }

    // The next render works normally
    let outcome = sandbox.render("export default () => <p>fine</p>;");
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "fine");
}

#[test]
fn test_missing_export_is_reported() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render("const helper = 1;");
    assert_eq!(
        outcome,
        RenderOutcome::Errored(PreviewError::ExportMissing {
            message: "No valid React component found. Make sure to export a default component."
                .to_string()
        })
    );
}

#[test]
fn test_entry_point_fallbacks() {
    let mut sandbox = sandbox();

    sandbox.render("export function PreviewComponent() { return <i>named</i>; }");
    assert_eq!(sandbox.region().text_content(), "named");

    sandbox.render("module.exports = () => <i>commonjs</i>;");
    assert_eq!(sandbox.region().text_content(), "commonjs");

    sandbox.render("export default <em>element</em>;");
    assert_eq!(sandbox.region().text_content(), "element");

    let outcome = sandbox.render("export default 42;");
    assert_eq!(outcome.error().map(|e| e.kind()), Some("export-missing"));
}

#[test]
fn test_render_is_idempotent() {
    let mut sandbox = sandbox();
    sandbox.render(COUNTER);
    let first = sandbox.region().to_html();
    sandbox.render(COUNTER);
    assert_eq!(sandbox.region().to_html(), first);
    assert!(first.contains("Count: 0"));
}

#[test]
fn test_new_text_fully_resets_previous_state() {
    let mut sandbox = sandbox();
    sandbox.render(COUNTER);
    sandbox.dispatch("h0", &PreviewEvent::new());
    assert!(sandbox.region().text_content().contains("Count: 1"));

    // Same text again: fresh isolate, state starts over
    sandbox.render(COUNTER);
    assert!(sandbox.region().text_content().contains("Count: 0"));

    // An error replaces the view entirely
    sandbox.render("export default () => { throw new Error('second'); };");
    assert!(matches!(sandbox.region().content(), RegionContent::Error(_)));
    assert!(!sandbox.region().to_html().contains("Count"));
}

#[test]
fn test_state_persists_across_interactions() {
    let mut sandbox = sandbox();
    sandbox.render(COUNTER);
    for _ in 0..3 {
        assert_eq!(sandbox.dispatch("h0", &PreviewEvent::new()), RenderOutcome::Displayed);
    }
    assert_eq!(sandbox.region().text_content(), "Count: 3Add");
}

#[test]
fn test_controlled_input_receives_value() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        import { useState } from 'react';
        export default function Echo() {
          const [text, setText] = useState('');
          return (
            <label>
              <input value={text} onChange={(e) => setText(e.target.value)} />
              <output>{text.toUpperCase()}</output>
            </label>
          );
        }
        "#,
    );
    let outcome = sandbox.dispatch("h0", &PreviewEvent::new().with_value("hello"));
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "HELLO");
    assert!(sandbox.region().to_html().contains("value=\"hello\""));
}

#[test]
fn test_event_handler_error_becomes_errored_outcome() {
    let mut sandbox = sandbox();
    sandbox.render(
        "export default () => <button onClick={() => { throw new Error('click failed'); }}>x</button>;",
    );
    let outcome = sandbox.dispatch("h0", &PreviewEvent::new());
    let (message, phase) = runtime_error(&outcome);
    assert_eq!(message, "click failed");
    assert_eq!(phase, RuntimePhase::Event);
    assert!(!sandbox.is_mounted());

    let transitions: Vec<String> = sandbox.transitions().iter().map(|t| t.to_string()).collect();
    assert_eq!(transitions.last().map(String::as_str), Some("Displayed -> Errored"));

    // Further interaction returns the same errored outcome
    assert_eq!(sandbox.dispatch("h0", &PreviewEvent::new()), outcome);
}

#[test]
fn test_unknown_handler_is_ignored() {
    let mut sandbox = sandbox();
    sandbox.render(COUNTER);
    assert_eq!(sandbox.dispatch("h99", &PreviewEvent::new()), RenderOutcome::Displayed);
    assert!(sandbox.is_mounted());
}

#[test]
fn test_timers_drive_updates() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        import { useEffect, useState } from 'react';
        export default function Clock() {
          const [ticks, setTicks] = useState(0);
          useEffect(() => {
            const id = setInterval(() => setTicks((t) => t + 1), 1000);
            return () => clearInterval(id);
          }, []);
          return <p>{ticks} ticks</p>;
        }
        "#,
    );
    assert_eq!(sandbox.region().text_content(), "0 ticks");
    assert_eq!(sandbox.view_stats().timers, 1);

    sandbox.advance_timers(Duration::from_millis(3500));
    assert_eq!(sandbox.region().text_content(), "3 ticks");
}

#[test]
fn test_timer_error_becomes_errored_outcome() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        import { useEffect } from 'react';
        export default function Late() {
          useEffect(() => { setTimeout(() => { throw new Error('late failure'); }, 50); }, []);
          return <p>waiting</p>;
        }
        "#,
    );
    assert!(sandbox.outcome().is_displayed());
    let outcome = sandbox.advance_timers(Duration::from_millis(100));
    let (message, phase) = runtime_error(&outcome);
    assert_eq!(message, "late failure");
    assert_eq!(phase, RuntimePhase::Timer);
}

#[test]
fn test_animation_frames_run_on_frame_boundaries() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        import { useEffect, useState } from 'react';
        export default function Frames() {
          const [frames, setFrames] = useState(0);
          useEffect(() => {
            let id = 0;
            const step = () => { setFrames((f) => f + 1); id = requestAnimationFrame(step); };
            id = requestAnimationFrame(step);
            return () => cancelAnimationFrame(id);
          }, []);
          return <p>{frames}</p>;
        }
        "#,
    );
    sandbox.advance_timers(Duration::from_millis(50));
    assert_eq!(sandbox.region().text_content(), "3");
}

#[test]
fn test_infinite_rerender_is_reported() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        r#"
        import { useState } from 'react';
        export default function Loop() {
          const [n, setN] = useState(0);
          setN(n + 1);
          return <p>{n}</p>;
        }
        "#,
    );
    let (message, _) = runtime_error(&outcome);
    assert!(message.starts_with("Too many re-renders"), "{}", message);
}

#[test]
fn test_runaway_loop_is_terminated() {
    initialize_v8_platform().unwrap();
    let runtime = RuntimeConfig {
        timeout: Duration::from_millis(200),
        ..RuntimeConfig::default()
    };
    let mut sandbox = PreviewSandbox::with_settings(
        Box::new(TsxTransform::new()),
        runtime,
        CapabilitySet::rendering_library(),
    );
    let outcome = sandbox.render("export default function Spin() { while (true) {} }");
    let (message, _) = runtime_error(&outcome);
    assert!(message.contains("terminated"), "{}", message);

    // The sandbox recovers on the next render
    assert_eq!(sandbox.render("export default () => <b>ok</b>;"), RenderOutcome::Displayed);
}

#[test]
fn test_host_globals_are_unreachable() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        const probes = {
          fetch: typeof fetch,
          localStorage: typeof localStorage,
          document: typeof document,
          window: typeof window,
          process: typeof process,
          globalReact: typeof globalThis.React,
        };
        export default () => <pre>{JSON.stringify(probes)}</pre>;
        "#,
    );
    assert_eq!(
        sandbox.region().text_content(),
        r#"{"fetch":"undefined","localStorage":"undefined","document":"undefined","window":"undefined","process":"undefined","globalReact":"undefined"}"#
    );
}

#[test]
fn test_globals_do_not_leak_between_renders() {
    let mut sandbox = sandbox();
    sandbox.render("globalThis.leaked = 'yes'; export default () => <p>one</p>;");
    sandbox.render("export default () => <p>{typeof globalThis.leaked}</p>;");
    assert_eq!(sandbox.region().text_content(), "undefined");
}

#[test]
fn test_ungranted_module_resolves_to_empty_object() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        "import * as icons from 'lucide-react';\nexport default () => <p>{Object.keys(icons).length}</p>;",
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "0");
}

#[test]
fn test_strict_modules_reject_ungranted_imports() {
    initialize_v8_platform().unwrap();
    let mut sandbox = PreviewSandbox::with_settings(
        Box::new(TsxTransform::new()),
        RuntimeConfig::default(),
        CapabilitySet::rendering_library().with_strict_modules(true),
    );
    let outcome = sandbox.render("import x from 'lodash';\nexport default () => null;");
    let (message, phase) = runtime_error(&outcome);
    assert!(message.contains("lodash"), "{}", message);
    assert_eq!(phase, RuntimePhase::Module);
}

#[test]
fn test_timers_absent_without_capability() {
    initialize_v8_platform().unwrap();
    let mut sandbox = PreviewSandbox::with_settings(
        Box::new(TsxTransform::new()),
        RuntimeConfig::default(),
        CapabilitySet::none().with(Capability::ReactLibrary),
    );
    sandbox.render("export default () => <p>{typeof setTimeout}</p>;");
    assert_eq!(sandbox.region().text_content(), "undefined");
}

#[test]
fn test_error_boundary_catches_child_errors() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        r#"
        import React from 'react';
        class Boundary extends React.Component<{ children: React.ReactNode }, { failed: boolean }> {
          state = { failed: false };
          static getDerivedStateFromError() { return { failed: true }; }
          render() { return this.state.failed ? <p>recovered</p> : this.props.children; }
        }
        function Broken(): JSX.Element { throw new Error('inner'); }
        export default () => <Boundary><Broken /></Boundary>;
        "#,
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "recovered");
}

#[test]
fn test_context_and_reducer() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        import { createContext, useContext, useReducer } from 'react';
        const Theme = createContext('light');
        type Action = { type: 'inc' };
        function reducer(state: number, action: Action) { return action.type === 'inc' ? state + 1 : state; }
        function Label() { return <span>{useContext(Theme)}</span>; }
        export default function App() {
          const [n, dispatch] = useReducer(reducer, 0);
          return (
            <Theme.Provider value="dark">
              <Label />
              <button onClick={() => dispatch({ type: 'inc' })}>{n}</button>
            </Theme.Provider>
          );
        }
        "#,
    );
    assert_eq!(sandbox.region().text_content(), "dark0");
    sandbox.dispatch("h0", &PreviewEvent::new());
    assert_eq!(sandbox.region().text_content(), "dark1");
}

#[test]
fn test_enum_and_list_rendering() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"
        enum Status { Todo, Done }
        const items = [{ id: 1, status: Status.Done }, { id: 2, status: Status.Todo }];
        export default () => (
          <ul>
            {items.map((item) => <li key={item.id}>{Status[item.status]}</li>)}
          </ul>
        );
        "#,
    );
    assert_eq!(sandbox.region().text_content(), "DoneTodo");
}

#[test]
fn test_html_rendering_of_view() {
    let mut sandbox = sandbox();
    sandbox.render(
        r#"export default () => (
          <div className="card" style={{ marginTop: 4, opacity: 0.5 }}>
            <label htmlFor="name">Name &amp; title</label>
            <input id="name" disabled />
          </div>
        );"#,
    );
    let html = sandbox.region().to_html();
    assert!(html.contains("class=\"card\""), "{}", html);
    assert!(html.contains("margin-top: 4px"), "{}", html);
    assert!(html.contains("opacity: 0.5"), "{}", html);
    assert!(html.contains("for=\"name\""), "{}", html);
    assert!(html.contains("Name &amp; title"), "{}", html);
    assert!(html.contains("disabled"), "{}", html);
}

#[test]
fn test_console_output_does_not_affect_outcome() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        "console.log('hello'); console.error('noise'); export default () => <p>quiet</p>;",
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
}

#[test]
fn test_heap_exhaustion_is_contained() {
    initialize_v8_platform().unwrap();
    let runtime = RuntimeConfig {
        max_heap_size_bytes: 64 * 1024 * 1024,
        timeout: Duration::from_secs(30),
        ..RuntimeConfig::default()
    };
    let mut sandbox = PreviewSandbox::with_settings(
        Box::new(TsxTransform::new()),
        runtime,
        CapabilitySet::rendering_library(),
    );
    let outcome = sandbox.render(
        r#"export default function Hoard() {
          const kept = [];
          while (true) kept.push(new Array(100000).fill(1));
        }"#,
    );
    let (message, phase) = runtime_error(&outcome);
    assert!(message.contains("heap limit exceeded"), "{}", message);
    assert_eq!(phase, RuntimePhase::Mount);
    assert_eq!(sandbox.state(), PreviewState::Errored);

    assert_eq!(sandbox.render("export default () => <b>ok</b>;"), RenderOutcome::Displayed);
}

#[test]
fn test_non_finite_numbers_render_like_a_browser() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        r#"export default function Progress() {
          const total = 0;
          return (
            <div style={{ width: (5 / total) * 100, opacity: 0 / 0 }}>
              <progress value={NaN} max={Infinity} />
            </div>
          );
        }"#,
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
    let html = sandbox.region().to_html();
    assert!(html.contains("width: Infinity"), "{}", html);
    assert!(html.contains("value=\"NaN\""), "{}", html);
    assert!(html.contains("max=\"Infinity\""), "{}", html);
}

#[test]
fn test_deeply_nested_view_displays() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        r#"function Nest({ n }: { n: number }) {
          return n === 0 ? <span>bottom</span> : <div><Nest n={n - 1} /></div>;
        }
        export default () => <Nest n={200} />;"#,
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "bottom");
    assert_eq!(sandbox.region().to_html().matches("<div>").count(), 200);
}

#[test]
fn test_logging_cyclic_objects_does_not_fail_the_render() {
    let mut sandbox = sandbox();
    let outcome = sandbox.render(
        r#"export default function Loop() {
          const node: any = { label: 'root' };
          node.parent = node;
          console.log('state', node);
          return <p>fine</p>;
        }"#,
    );
    assert_eq!(outcome, RenderOutcome::Displayed);
    assert_eq!(sandbox.region().text_content(), "fine");
}
