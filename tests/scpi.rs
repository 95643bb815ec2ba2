mod common;

use common::*;
use tickflow::bytecode::compiler::{ScpiAssembler, global_ref, literal_int, local_ref};
use tickflow::bytecode::opcode::ScpiOp;
use tickflow::flow::ComponentExecutionState;
use tickflow::prelude::*;
use tickflow::scpi::response::{
    escape_quoted, parse_response, parse_text, strip_line_terminator, unescape_quoted,
};
use tickflow::scpi::{CommandBuffer, RequestTicket};

fn scpi_state(engine: &FlowEngine, page: FlowStateId) -> (ScpiOp, usize, String) {
    match engine.execution_state(page, 1) {
        Some(ComponentExecutionState::Scpi(state)) => {
            (state.op(), state.cursor(), state.command().to_string())
        }
        other => panic!("expected an SCPI execution state, found {:?}", other),
    }
}

#[test]
fn test_resume_reenters_at_the_same_cursor() {
    let instructions = ScpiAssembler::new()
        .text("MEAS:")
        .expr(&global_ref(0))
        .text("?")
        .query_into(&local_ref(0))
        .finish();
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(scpi_flow(instructions), host.clone());
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    assert_eq!(host.history().len(), 1);
    assert_eq!(host.history()[0].text, "MEAS:VOLT?");
    let suspended = scpi_state(&engine, page);
    assert_eq!(suspended.0, ScpiOp::QueryWithAssignment);
    assert_eq!(suspended.2, "MEAS:VOLT?");
    assert!(engine.is_waiting(page, 1));

    // No response yet: nothing is re-appended or re-dispatched
    engine.tick(16, &mut ui);
    engine.tick(32, &mut ui);
    assert_eq!(scpi_state(&engine, page), suspended);
    assert_eq!(host.history().len(), 1);

    let (_, accepted) = host.respond(ScpiResponse::text("42\r\n")).unwrap();
    assert!(accepted);
    engine.tick(48, &mut ui);

    assert_eq!(engine.local(page, 0), Some(&Value::Integer(42)));
    assert_eq!(engine.local(page, 1), Some(&Value::Bool(true)));
    assert!(engine.execution_state(page, 1).is_none());
    assert!(!engine.gateway().is_busy());
    assert!(engine.drain_errors().is_empty());
}

#[test]
fn test_only_one_request_is_outstanding() {
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(scpi_flow(voltage_query()), host.clone());
    let first = engine.start_flow(0).unwrap();
    let second = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    assert_eq!(host.history().len(), 1);
    assert_eq!(host.pending_count(), 1);
    assert!(engine.is_waiting(first, 1));
    assert!(engine.is_waiting(second, 1));

    engine.tick(16, &mut ui);
    assert_eq!(host.history().len(), 1, "a busy slot must not dispatch");

    host.respond(ScpiResponse::text("1.5"));
    engine.tick(32, &mut ui);

    // The first state consumed its result and freed the slot for the second
    assert_eq!(engine.local(first, 0), Some(&Value::Number(1.5)));
    assert_eq!(host.history().len(), 2);
    assert!(engine.is_waiting(second, 1));

    host.respond(ScpiResponse::text("2"));
    engine.tick(48, &mut ui);
    assert_eq!(engine.local(second, 0), Some(&Value::Integer(2)));
}

#[test]
fn test_gateway_state_machine() {
    let mut gateway = AsyncIoGateway::new();
    let mut host = RecordingHost::new();
    let a = gateway.allocate_ticket();
    let b = gateway.allocate_ticket();
    assert_ne!(a, b);

    let request = |ticket: RequestTicket| {
        Ok::<_, ()>(ScpiRequest {
            ticket,
            instrument: Value::Null,
            text: "*IDN?".to_string(),
            is_query: true,
            timeout_ms: -1,
            delay_ms: -1,
        })
    };

    assert_eq!(gateway.issue(a, &mut host, || request(a)), Ok(IoStatus::Queued));
    assert_eq!(gateway.owner(), Some(a));

    let status = gateway.issue(b, &mut host, || -> std::result::Result<ScpiRequest, ()> {
        panic!("a busy gateway must not build a request")
    });
    assert_eq!(status, Ok(IoStatus::NotReady));
    assert_eq!(gateway.issue(a, &mut host, || request(a)), Ok(IoStatus::NotReady));

    host.respond(ScpiResponse::text("ACME"));
    assert_eq!(gateway.issue(b, &mut host, || request(b)), Ok(IoStatus::NotReady));
    assert_eq!(
        gateway.issue(a, &mut host, || request(a)),
        Ok(IoStatus::Ready(ScpiResponse::text("ACME")))
    );
    assert!(!gateway.is_busy());
    assert_eq!(gateway.issue(b, &mut host, || request(b)), Ok(IoStatus::Queued));
    assert_eq!(host.history().len(), 2);
}

#[test]
fn test_failed_request_build_frees_the_slot() {
    let mut gateway = AsyncIoGateway::new();
    let mut host = RecordingHost::new();
    let ticket = gateway.allocate_ticket();

    let status = gateway.issue(ticket, &mut host, || Err("bad instrument"));
    assert_eq!(status, Err("bad instrument"));
    assert!(!gateway.is_busy());
    assert_eq!(host.pending_count(), 0);
}

#[test]
fn test_quoted_number_response_stays_a_string() {
    let host = ScriptedHost::new().with_response(VOLTAGE_QUERY, ScpiResponse::text("\"3.14\"\r\n"));
    let (mut engine, debugger) = engine_with(scpi_flow(voltage_query()), host);
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    engine.tick(16, &mut ui);

    let value = engine.local(page, 0).cloned();
    assert_eq!(value, Some(Value::String("3.14".to_string())));
    assert_eq!(value.map(|v| v.to_string().len()), Some(4));

    let events = debugger.events();
    assert!(events.contains(&DebuggerEvent::ScpiIssued {
        flow_state: page.0,
        component: 1,
        text: VOLTAGE_QUERY.to_string(),
        is_query: true,
    }));
    assert!(events.contains(&DebuggerEvent::ScpiCompleted {
        flow_state: page.0,
        component: 1,
        error: None,
        result: Some("3.14".to_string()),
    }));
}

#[test]
fn test_blob_response_bypasses_text_processing() {
    let bytes = b"\"1\"\r\n".to_vec();
    let host = ScriptedHost::new().with_response(VOLTAGE_QUERY, ScpiResponse::blob(bytes.clone()));
    let (mut engine, _) = engine_with(scpi_flow(voltage_query()), host);
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    engine.tick(16, &mut ui);

    assert_eq!(engine.local(page, 0), Some(&Value::Blob(bytes)));
}

#[test]
fn test_instrument_error_aborts_without_output() {
    let host = ScriptedHost::new().with_response(VOLTAGE_QUERY, ScpiResponse::error("VI_ERROR_TMO"));
    let (mut engine, debugger) = engine_with(scpi_flow(voltage_query()), host);
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    engine.tick(16, &mut ui);

    let errors = engine.drain_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ComponentError::Instrument { component: 1, message, .. } if message == "VI_ERROR_TMO"
    ));
    assert_eq!(engine.local(page, 0), Some(&Value::Null));
    assert_eq!(engine.local(page, 1), Some(&Value::Null), "output must not propagate");
    assert!(engine.execution_state(page, 1).is_none());
    assert!(!engine.is_waiting(page, 1));
    assert!(debugger.events().iter().any(|e| matches!(
        e,
        DebuggerEvent::ComponentFailed { flow_state: Some(id), .. } if *id == page.0
    )));
}

#[test]
fn test_evaluation_error_aborts_before_dispatch() {
    let instructions = ScpiAssembler::new()
        .text("VOLT ")
        .expr(&global_ref(7))
        .command()
        .finish();
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(scpi_flow(instructions), host.clone());
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);

    let errors = engine.drain_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ComponentError::Evaluation {
            source: EvaluationError::UnknownVariable { scope: "global", index: 7 },
            ..
        }
    ));
    assert!(host.history().is_empty());
    assert!(engine.execution_state(page, 1).is_none());
}

#[test]
fn test_command_then_query_in_sequence() {
    let instructions = ScpiAssembler::new()
        .text("*RST")
        .command()
        .text("*IDN?")
        .query()
        .finish();
    let host = ScriptedHost::new().with_response("*IDN?", ScpiResponse::text("ACME,DMM,1,0.1\r\n"));
    let (mut engine, debugger) = engine_with(scpi_flow(instructions), host);
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    engine.tick(16, &mut ui);
    assert!(engine.is_waiting(page, 1));
    engine.tick(32, &mut ui);
    assert!(!engine.is_waiting(page, 1));
    assert_eq!(engine.local(page, 1), Some(&Value::Bool(true)));

    let completions: Vec<_> = debugger
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DebuggerEvent::ScpiCompleted { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(
        completions,
        vec![None, Some("ACME,DMM,1,0.1".to_string())]
    );
}

#[test]
fn test_timeout_and_delay_are_forwarded() {
    let mut assets = scpi_flow(voltage_query());
    if let ComponentKind::Scpi(scpi) = &mut assets.flows[0].components[1].kind {
        scpi.timeout = Some(literal_int(500));
    }
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(assets, host.clone());
    engine.start_flow(0).unwrap();

    engine.tick(0, &mut HeadlessUi::new());

    let request = &host.history()[0];
    assert_eq!(request.instrument, Value::from("dmm"));
    assert_eq!(request.timeout_ms, 500);
    assert_eq!(request.delay_ms, -1);
    assert!(request.is_query);
}

#[test]
fn test_teardown_releases_the_slot() {
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(scpi_flow(voltage_query()), host.clone());
    let first = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    assert!(engine.gateway().is_busy());

    assert!(engine.destroy_flow_state(first));
    assert!(!engine.gateway().is_busy());
    assert!(engine.flow_state(first).is_none());

    // The late completion no longer owns the slot
    let (_, accepted) = host.respond(ScpiResponse::text("1")).unwrap();
    assert!(!accepted);

    let second = engine.start_flow(0).unwrap();
    engine.tick(16, &mut ui);
    assert_eq!(host.history().len(), 2);
    assert!(engine.is_waiting(second, 1));
}

#[test]
fn test_completion_after_stop_is_dropped() {
    let host = RecordingHost::new();
    let (mut engine, _) = engine_with(scpi_flow(voltage_query()), host.clone());
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();

    engine.tick(0, &mut ui);
    engine.stop();
    assert!(engine.is_stopped());

    let (_, accepted) = host.respond(ScpiResponse::text("1")).unwrap();
    assert!(!accepted);

    let report = engine.tick(16, &mut ui);
    assert_eq!(report.executed, 0);
    assert_eq!(engine.local(page, 0), Some(&Value::Null));
}

#[test]
fn test_long_command_is_truncated_to_capacity() {
    let config = EngineConfig {
        command_buffer_capacity: 8,
        ..EngineConfig::default()
    };
    let instructions = ScpiAssembler::new()
        .text("SYST:BEEP:STATE ON")
        .command()
        .finish();
    let host = RecordingHost::new();
    let mut engine = FlowEngine::builder(scpi_flow(instructions))
        .with_config(config)
        .with_host(host.clone())
        .build()
        .unwrap();
    engine.start_flow(0).unwrap();

    engine.tick(0, &mut HeadlessUi::new());

    assert_eq!(host.history()[0].text, "SYST:BEE");
}

/// Runs `instructions` through the SCPI fixture and returns the single decode error.
fn run_malformed(instructions: Vec<u8>, ticks: u64) -> (FlowEngine, FlowStateId, DecodeError) {
    let (mut engine, debugger) = engine_with(scpi_flow(instructions), ScriptedHost::new());
    let page = engine.start_flow(0).unwrap();
    let mut ui = HeadlessUi::new();
    for tick in 0..ticks {
        engine.tick(tick * 16, &mut ui);
    }

    let mut errors = engine.drain_errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    let source = match errors.remove(0) {
        ComponentError::Decode {
            component: 1,
            source,
            ..
        } => source,
        other => panic!("expected a decode error, found {:?}", other),
    };
    assert!(engine.execution_state(page, 1).is_none());
    assert!(!engine.is_waiting(page, 1));
    assert!(!engine.gateway().is_busy());
    assert_eq!(engine.local(page, 1), Some(&Value::Null), "output must not propagate");
    assert!(debugger.events().iter().any(|e| matches!(
        e,
        DebuggerEvent::ComponentFailed { flow_state: Some(id), .. } if *id == page.0
    )));
    (engine, page, source)
}

#[test]
fn test_missing_end_after_command_aborts() {
    let mut instructions = ScpiAssembler::new().text("X").command().finish();
    assert_eq!(instructions.pop(), Some(ScpiOp::End as u8));

    // Tick 0 issues the command, tick 16 consumes the acknowledgement and runs off the end
    let (mut engine, page, source) = run_malformed(instructions, 2);
    assert_eq!(
        source,
        DecodeError::OutOfBounds {
            offset: 5,
            needed: 1,
            len: 5
        }
    );

    engine.tick(32, &mut HeadlessUi::new());
    assert!(engine.drain_errors().is_empty());
    assert!(engine.execution_state(page, 1).is_none());
}

#[test]
fn test_literal_longer_than_stream_aborts() {
    let instructions = vec![ScpiOp::AppendString as u8, 10, 0, b'A'];
    let (_, _, source) = run_malformed(instructions, 1);
    assert_eq!(
        source,
        DecodeError::OutOfBounds {
            offset: 3,
            needed: 10,
            len: 4
        }
    );
}

#[test]
fn test_unknown_scpi_opcode_aborts() {
    let mut instructions = ScpiAssembler::new().text("A").finish();
    instructions.pop();
    instructions.push(0x09);
    let (_, _, source) = run_malformed(instructions, 1);
    assert_eq!(
        source,
        DecodeError::UnknownOpcode {
            stream: "scpi",
            opcode: 0x09,
            offset: 4,
        }
    );

    let (_, _, source) = run_malformed(vec![0x2a], 1);
    assert!(matches!(
        source,
        DecodeError::UnknownOpcode { opcode: 0x2a, offset: 0, .. }
    ));
}

#[test]
fn test_command_buffer_truncates_on_char_boundary() {
    let mut buffer = CommandBuffer::new(4);
    assert!(buffer.push_str("AB"));
    assert!(!buffer.push_str("Cé"));
    assert_eq!(buffer.as_str(), "ABC");
    assert!(!buffer.push_str("DEF"));
    assert_eq!(buffer.as_str(), "ABCD");
    buffer.clear();
    assert!(buffer.is_empty());
}

#[test]
fn test_response_text_parsing() {
    assert_eq!(parse_text("\"3.14\"\r\n"), Value::from("3.14"));
    assert_eq!(parse_text("42\r\n"), Value::Integer(42));
    assert_eq!(parse_text("-1.5E-3"), Value::Number(-1.5e-3));
    assert_eq!(parse_text("1.0"), Value::Number(1.0));
    assert_eq!(parse_text("12V"), Value::from("12V"));
    assert_eq!(parse_text(""), Value::from(""));
    assert_eq!(strip_line_terminator("A\r\n\r\n"), "A\r\n");
    assert_eq!(strip_line_terminator("A\n"), "A\n");
}

#[test]
fn test_quoted_responses_unescape() {
    assert_eq!(
        unescape_quoted(r#""say ""hi"""#).as_deref(),
        Some(r#"say "hi""#)
    );
    // Unbalanced quoting is not a string and falls through to raw text
    assert_eq!(unescape_quoted(r#""a"b""#), None);
    assert_eq!(unescape_quoted("\""), None);
    assert_eq!(parse_text(r#""a"b""#), Value::from(r#""a"b""#));

    for text in ["", "plain", r#"one " quote"#, r#""""#, r#"x""y"#] {
        assert_eq!(unescape_quoted(&escape_quoted(text)).as_deref(), Some(text));
    }

    let once = parse_text("OUTP ON");
    assert_eq!(parse_text(&once.to_string()), once);
}

#[test]
fn test_blob_payload_is_not_post_processed() {
    let response = ScpiResponse::blob(b"\"1\"\r\n".to_vec());
    assert_eq!(parse_response(&response), Value::Blob(b"\"1\"\r\n".to_vec()));
}
