//! Streaming session behaviour: coalescing, fences and reset

use preview_sandbox::app::preview::{PreviewSandbox, PreviewSession, PreviewState};
use preview_sandbox::app::source::StringChunkSource;
use preview_sandbox::app::v8_bindings::initialize_v8_platform;

const FENCED: &str = "Here is your component:\n\n```tsx\nexport default function PreviewComponent() {\n  return <h1 className=\"text-xl\">Hello</h1>;\n}\n```\n\nLet me know if you want changes.";

fn session() -> PreviewSession {
    initialize_v8_platform().unwrap();
    PreviewSession::new(PreviewSandbox::new())
}

#[test]
fn test_stream_ends_displayed_after_intermediate_errors() {
    let mut session = session();
    let mut source = StringChunkSource::new(FENCED, 7);
    let outcome = session.drive(&mut source, 3);

    assert!(outcome.is_displayed(), "{}", outcome);
    assert_eq!(session.sandbox().region().text_content(), "Hello");
    assert!(session.render_count() > 1);
    // Partial prefixes fail to transform on the way
    assert!(session
        .transitions()
        .iter()
        .any(|t| t.to == PreviewState::Errored));
    assert_eq!(session.state(), PreviewState::Displayed);
}

#[test]
fn test_prose_chunks_do_not_trigger_rerender() {
    let mut session = session();
    session.replace(FENCED);
    session.flush();
    let renders = session.render_count();

    // Trailing prose after the closing fence leaves the code unchanged
    session.push_chunk(" Thanks!");
    session.flush();
    assert_eq!(session.render_count(), renders);
}

#[test]
fn test_every_chunk_rendered_when_render_every_is_one() {
    let mut session = session();
    let mut source = StringChunkSource::from_chunks(["export default ", "() => <p>a</p>;"]);
    session.drive(&mut source, 1);
    // One per chunk; the final flush sees unchanged text
    assert_eq!(session.render_count(), 2);
}

#[test]
fn test_reset_between_generations() {
    let mut session = session();
    session.replace("export default () => <p>first</p>;");
    session.flush();

    session.reset();
    assert_eq!(session.state(), PreviewState::Empty);

    let mut source = StringChunkSource::from_chunks(["\n\nexport default () => <p>second</p>;"]);
    session.drive(&mut source, 1);
    assert_eq!(session.document().text(), "export default () => <p>second</p>;");
    assert_eq!(session.sandbox().region().text_content(), "second");
}
