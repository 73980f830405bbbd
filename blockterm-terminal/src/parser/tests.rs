use super::*;
use proptest::prelude::*;

const A: &[u8] = b"\x1b]133;A\x07";
const B: &[u8] = b"\x1b]133;B\x07";
const C: &[u8] = b"\x1b]133;C\x07";

fn end(code: i32) -> Vec<u8> {
    format!("\x1b]133;D;{code}\x07").into_bytes()
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Feed `chunks` then finish; returns (display bytes, boundary events).
fn run<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> (Vec<u8>, Vec<BoundaryEvent>) {
    let mut parser = BoundaryParser::new();
    let mut outputs = Vec::new();
    for chunk in chunks {
        outputs.extend(parser.feed(chunk));
    }
    outputs.extend(parser.finish());
    split_outputs(outputs)
}

fn split_outputs(outputs: Vec<ParserOutput>) -> (Vec<u8>, Vec<BoundaryEvent>) {
    let mut display = Vec::new();
    let mut events = Vec::new();
    for item in outputs {
        match item {
            ParserOutput::Display(bytes) => display.extend(bytes),
            ParserOutput::Boundary(event) => events.push(event),
        }
    }
    (display, events)
}

#[test]
fn test_basic_block_segmentation() {
    let d0 = end(0);
    let stream = concat(&[A, B, b"ls\n", b"file.txt\n", &d0, A]);
    let (display, events) = run([stream.as_slice()]);

    assert_eq!(display, b"ls\nfile.txt\n");

    let start = (A.len() + B.len()) as u64;
    let finish = start + 12;
    assert_eq!(
        events,
        vec![
            BoundaryEvent::PromptStarted { offset: 0 },
            BoundaryEvent::BlockOpened {
                block_id: BlockId(1),
                start_offset: start,
            },
            BoundaryEvent::BlockClosed {
                block_id: BlockId(1),
                end_offset: finish,
                exit_code: Some(0),
                reason: CloseReason::Finished,
            },
            BoundaryEvent::PromptStarted {
                offset: finish + d0.len() as u64,
            },
        ]
    );
    assert_eq!(
        &stream[start as usize..finish as usize],
        b"ls\nfile.txt\n".as_slice()
    );
}

#[test]
fn test_exit_codes_are_reported_exactly() {
    for code in [0, 1, 2, 127, 130, 255, -1, i32::MAX, i32::MIN] {
        let stream = concat(&[B, b"x", &end(code)]);
        let (_, events) = run([stream.as_slice()]);
        assert!(
            matches!(
                events.last(),
                Some(BoundaryEvent::BlockClosed { exit_code: Some(c), reason: CloseReason::Finished, .. }) if *c == code
            ),
            "exit code {code} not preserved: {events:?}"
        );
    }
}

#[test]
fn test_command_start_while_open_force_closes() {
    let stream = concat(&[B, b"first", B, b"second", &end(1)]);
    let (_, events) = run([stream.as_slice()]);

    let second_b = (B.len() + 5) as u64;
    assert_eq!(
        events,
        vec![
            BoundaryEvent::BlockOpened {
                block_id: BlockId(1),
                start_offset: B.len() as u64,
            },
            BoundaryEvent::BlockClosed {
                block_id: BlockId(1),
                end_offset: second_b,
                exit_code: None,
                reason: CloseReason::Superseded,
            },
            BoundaryEvent::BlockOpened {
                block_id: BlockId(2),
                start_offset: second_b + B.len() as u64,
            },
            BoundaryEvent::BlockClosed {
                block_id: BlockId(2),
                end_offset: second_b + B.len() as u64 + 6,
                exit_code: Some(1),
                reason: CloseReason::Finished,
            },
        ]
    );
}

#[test]
fn test_prompt_start_while_open_force_closes() {
    let stream = concat(&[B, b"vim", A]);
    let (_, events) = run([stream.as_slice()]);
    assert!(matches!(
        events[1],
        BoundaryEvent::BlockClosed {
            reason: CloseReason::Superseded,
            exit_code: None,
            ..
        }
    ));
    assert!(matches!(events[2], BoundaryEvent::PromptStarted { .. }));
}

#[test]
fn test_missing_command_end_closes_on_finish() {
    let stream = concat(&[B, b"sleep 5"]);
    let mut parser = BoundaryParser::new();
    let (_, events) = split_outputs(parser.feed(&stream));
    assert_eq!(events.len(), 1);
    assert_eq!(parser.phase(), BlockPhase::CommandActive);

    let (_, events) = split_outputs(parser.finish());
    assert_eq!(
        events,
        vec![BoundaryEvent::BlockClosed {
            block_id: BlockId(1),
            end_offset: stream.len() as u64,
            exit_code: None,
            reason: CloseReason::SessionEnded,
        }]
    );
    assert_eq!(parser.phase(), BlockPhase::AwaitingPrompt);
    assert!(parser.open_block().is_none());
}

#[test]
fn test_command_end_without_block_is_ignored() {
    let d = end(3);
    let mut parser = BoundaryParser::new();
    let (display, events) = split_outputs(parser.feed(&concat(&[A, &d])));
    assert!(display.is_empty());
    assert_eq!(events, vec![BoundaryEvent::PromptStarted { offset: 0 }]);
    assert_eq!(parser.phase(), BlockPhase::AwaitingPrompt);
}

#[test]
fn test_command_executed_records_output_offset() {
    let stream = concat(&[B, b"make\n", C, b"ok\n", &end(0)]);
    let (_, events) = run([stream.as_slice()]);
    let expected = (B.len() + 5 + C.len()) as u64;
    assert!(events.contains(&BoundaryEvent::CommandExecuted {
        block_id: BlockId(1),
        offset: expected,
    }));
}

#[test]
fn test_marker_split_at_every_byte() {
    let stream = concat(&[b"pre", A, B, b"cmd", C, b"out", &end(42), b"post"]);
    let (whole_display, whole_events) = run([stream.as_slice()]);

    for split in 0..=stream.len() {
        let (left, right) = stream.split_at(split);
        let (display, events) = run([left, right]);
        assert_eq!(display, whole_display, "display differs at split {split}");
        assert_eq!(events, whole_events, "events differ at split {split}");
    }
}

#[test]
fn test_byte_at_a_time_matches_whole() {
    let stream = concat(&[A, B, b"echo hi\n", C, b"hi\n", &end(0), A]);
    let whole = run([stream.as_slice()]);
    let bytewise = run(stream.chunks(1));
    assert_eq!(whole, bytewise);
}

#[test]
fn test_partial_marker_is_held_back() {
    let mut parser = BoundaryParser::new();
    let (display, events) = split_outputs(parser.feed(b"abc\x1b]13"));
    assert_eq!(display, b"abc");
    assert!(events.is_empty());
    assert_eq!(parser.held_back(), 4);

    let (display, events) = split_outputs(parser.feed(b"3;B\x07x"));
    assert_eq!(display, b"x");
    assert_eq!(
        events,
        vec![BoundaryEvent::BlockOpened {
            block_id: BlockId(1),
            start_offset: 11,
        }]
    );
    assert_eq!(parser.held_back(), 0);
}

#[test]
fn test_held_back_bytes_are_flushed_on_finish() {
    let mut parser = BoundaryParser::new();
    let mut outputs = parser.feed(b"tail\x1b]133;");
    outputs.extend(parser.finish());
    let (display, events) = split_outputs(outputs);
    assert_eq!(display, b"tail\x1b]133;");
    assert!(events.is_empty());
}

#[test]
fn test_foreign_sequences_pass_through() {
    let inputs: [&[u8]; 8] = [
        b"\x1b[31mred\x1b[0m",
        b"\x1b]0;window title\x07",
        b"\x1b]1337;SetMark\x07",
        b"\x1b]133;Z\x07",
        b"\x1b]133;A\nnewline breaks it",
        b"\x1b]133;A\x1b[0m",
        b"\x1b\x1b\x1b]",
        b"\x1b]7;relative/path\x07",
    ];
    for input in inputs {
        let (display, events) = run([input]);
        assert_eq!(display, input, "input {:?} was altered", String::from_utf8_lossy(input));
        assert!(events.is_empty(), "unexpected events for {input:?}: {events:?}");
    }
}

#[test]
fn test_refuted_prefix_then_real_marker() {
    let (display, events) = run([b"\x1b]133\x1b]133;A\x07".as_slice()]);
    assert_eq!(display, b"\x1b]133");
    assert_eq!(events, vec![BoundaryEvent::PromptStarted { offset: 5 }]);
}

#[test]
fn test_string_terminator_is_accepted() {
    let (display, events) = run([b"\x1b]133;B\x1b\\ls\x1b]133;D;7\x1b\\".as_slice()]);
    assert_eq!(display, b"ls");
    assert!(matches!(
        events.as_slice(),
        [
            BoundaryEvent::BlockOpened { .. },
            BoundaryEvent::BlockClosed {
                exit_code: Some(7),
                ..
            }
        ]
    ));
}

#[test]
fn test_oversized_payload_is_refuted() {
    let mut input = b"\x1b]133;".to_vec();
    input.extend(std::iter::repeat_n(b'a', 100));
    input.push(BEL);
    let (display, events) = run([input.as_slice()]);
    assert_eq!(display, input);
    assert!(events.is_empty());
}

#[test]
fn test_cwd_report_is_consumed() {
    let (display, events) = run([b"a\x1b]7;file://host/home/me\x07b".as_slice()]);
    assert_eq!(display, b"ab");
    assert_eq!(
        events,
        vec![BoundaryEvent::CwdChanged {
            cwd: "/home/me".to_string()
        }]
    );
}

#[test]
fn test_seeded_offset_shifts_block_offsets() {
    let mut parser = BoundaryParser::with_offset(1000);
    let (_, events) = split_outputs(parser.feed(B));
    assert_eq!(
        events,
        vec![BoundaryEvent::BlockOpened {
            block_id: BlockId(1),
            start_offset: 1000 + B.len() as u64,
        }]
    );
}

fn segment() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..16),
        proptest::collection::vec(prop_oneof![Just(ESC), Just(b']'), Just(b'1'), Just(b'3'), Just(b';'), Just(BEL)], 0..8),
        Just(A.to_vec()),
        Just(B.to_vec()),
        Just(C.to_vec()),
        any::<i32>().prop_map(end),
        Just(b"\x1b]133;D\x07".to_vec()),
        Just(b"\x1b]7;file:///tmp/x\x07".to_vec()),
        Just(b"\x1b]133;B\x1b\\".to_vec()),
    ]
}

proptest! {
    #[test]
    fn test_chunking_never_changes_results(
        segments in proptest::collection::vec(segment(), 0..24),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let stream: Vec<u8> = segments.concat();
        let whole = run([stream.as_slice()]);

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();
        let mut chunks = Vec::new();
        let mut prev = 0;
        for p in points {
            chunks.push(&stream[prev..p]);
            prev = p;
        }
        chunks.push(&stream[prev..]);

        let split = run(chunks);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn test_at_most_one_open_block(segments in proptest::collection::vec(segment(), 0..24)) {
        let stream: Vec<u8> = segments.concat();
        let (_, events) = run([stream.as_slice()]);
        let mut open: Option<BlockId> = None;
        for event in events {
            match event {
                BoundaryEvent::BlockOpened { block_id, .. } => {
                    prop_assert!(open.is_none(), "block {} opened while {:?} open", block_id, open);
                    open = Some(block_id);
                }
                BoundaryEvent::BlockClosed { block_id, .. } => {
                    prop_assert_eq!(open, Some(block_id));
                    open = None;
                }
                _ => {}
            }
        }
        // finish() always closes the last block
        prop_assert!(open.is_none());
    }

    #[test]
    fn test_plain_text_passes_through(bytes in proptest::collection::vec(any::<u8>().prop_filter("no ESC", |b| *b != ESC), 0..256)) {
        let (display, events) = run([bytes.as_slice()]);
        prop_assert_eq!(display, bytes);
        prop_assert!(events.is_empty());
    }
}
