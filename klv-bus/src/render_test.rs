use std::io::{self, Write};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::Renderer;
use crate::{
    decoder::{DecodeError, LocalSetDecoder, RecordDecoder},
    input::{FrameConfig, FrameReader},
    queue::{RecordSender, record_queue},
    record::{DecodedItem, RawRecord, Value},
    local_set::UAS_LOCAL_SET_KEY,
    testing::{DropFlag, frame, local_set},
    writer::{OutputFormat, OutputWriter, WriteError},
};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Payload byte `n` becomes one item tagged `n`; tag 0 has no name and a
/// payload starting with 0xff fails the whole record.
struct StubDecoder;

impl RecordDecoder for StubDecoder {
    fn decode(&self, record: &RawRecord) -> Result<Vec<DecodedItem>, DecodeError> {
        if record.payload().first() == Some(&0xff) {
            return Err(DecodeError::UnknownKey(record.key().to_vec()));
        }
        Ok(record
            .payload()
            .iter()
            .map(|b| match b {
                0 => DecodedItem::unknown(0, Bytes::new()),
                n => DecodedItem::new(*n as u64, "Field", "F", Value::Unsigned(*n as u64 * 10)),
            })
            .collect())
    }
}

/// Records every hook call.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl OutputWriter for Recorder {
    fn stream_start(&mut self, _out: &mut dyn Write) -> Result<(), WriteError> {
        self.0.lock().unwrap().push("stream_start".to_string());
        Ok(())
    }

    fn entry_start(&mut self, _out: &mut dyn Write, entry_index: u64) -> Result<(), WriteError> {
        self.0.lock().unwrap().push(format!("entry_start {}", entry_index));
        Ok(())
    }

    fn item(
        &mut self,
        _out: &mut dyn Write,
        item: &DecodedItem,
        entry_index: u64,
        item_index: u64,
    ) -> Result<(), WriteError> {
        item.name.ok_or(WriteError::UnsupportedField(item.tag))?;
        self.0
            .lock()
            .unwrap()
            .push(format!("item {}.{} tag {}", entry_index, item_index, item.tag));
        Ok(())
    }

    fn entry_end(&mut self, _out: &mut dyn Write, entry_index: u64) -> Result<(), WriteError> {
        self.0.lock().unwrap().push(format!("entry_end {}", entry_index));
        Ok(())
    }

    fn stream_end(&mut self, _out: &mut dyn Write) -> Result<(), WriteError> {
        self.0.lock().unwrap().push("stream_end".to_string());
        Ok(())
    }
}

const KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

fn enqueue(tx: &RecordSender, bytes: &[u8]) {
    let mut reader = FrameReader::new(bytes, FrameConfig::default()).unwrap();
    match reader.next_record().unwrap() {
        crate::input::ReadOutcome::Record(record) => tx.push(record).unwrap(),
        other => panic!("expected a record, got {:?}", other),
    }
}

async fn render_payloads(
    format: OutputFormat,
    payloads: &[&[u8]],
) -> anyhow::Result<(String, super::RenderStats)> {
    let (tx, rx) = record_queue();
    for payload in payloads {
        enqueue(&tx, &frame(&KEY, payload));
    }
    drop(tx);

    let sink = SharedBuf::default();
    let mut renderer = Renderer::new(Arc::new(StubDecoder), format.writer(), Box::new(sink.clone()))
        .with_poll_interval(Duration::from_millis(10));
    let stats = renderer.run(rx, CancellationToken::new()).await?;
    Ok((sink.contents(), stats))
}

#[tokio::test]
async fn test_text_output_for_two_records() -> anyhow::Result<()> {
    let (output, stats) = render_payloads(OutputFormat::Text, &[&[1, 2, 3, 4, 5], &[6]]).await?;
    assert!(output.starts_with("> KLV Packet #1\n\t [1] Field: 10\n"));
    assert!(output.contains("> KLV Packet #2\n\t [6] Field: 60\n"));
    assert_eq!(output.lines().count(), 2 + 6);
    assert_eq!(stats.records, 2);
    assert_eq!(stats.items, 6);
    Ok(())
}

#[tokio::test]
async fn test_csv_output_has_header_and_rows() -> anyhow::Result<()> {
    let (output, _) = render_payloads(OutputFormat::Csv, &[&[1, 2, 3, 4, 5], &[1, 2, 3, 4, 5]]).await?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 1 + 10);
    assert_eq!(lines[0], "#,tag,field,value");
    assert_eq!(lines[1], "1,1,Field,10");
    assert_eq!(lines[10], "2,5,Field,50");
    Ok(())
}

#[tokio::test]
async fn test_json_output_round_trips() -> anyhow::Result<()> {
    let (output, _) = render_payloads(OutputFormat::Json, &[&[1, 0, 2], &[0xff], &[3]]).await?;
    let doc: serde_json::Value = serde_json::from_str(&output)?;
    let entries = doc.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["items"].as_array().unwrap().len(), 2);
    assert_eq!(entries[1]["items"][0]["value"], 30);
    Ok(())
}

#[tokio::test]
async fn test_failures_keep_indices_dense() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    for payload in [&[1u8, 0, 2][..], &[0xff], &[3]] {
        enqueue(&tx, &frame(&KEY, payload));
    }
    drop(tx);

    let recorder = Recorder::default();
    let stats = Renderer::new(
        Arc::new(StubDecoder),
        Box::new(recorder.clone()),
        Box::new(io::sink()),
    )
    .run(rx, CancellationToken::new())
    .await?;

    assert_eq!(
        recorder.calls(),
        vec![
            "stream_start",
            "entry_start 1",
            "item 1.1 tag 1",
            "item 1.3 tag 2",
            "entry_end 1",
            "entry_start 2",
            "item 2.1 tag 3",
            "entry_end 2",
            "stream_end",
        ]
    );
    assert_eq!(stats.skipped_records, 1);
    assert_eq!(stats.skipped_items, 1);
    Ok(())
}

#[tokio::test]
async fn test_stop_before_any_record() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    enqueue(&tx, &frame(&KEY, &[1]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let recorder = Recorder::default();
    let stats = Renderer::new(
        Arc::new(StubDecoder),
        Box::new(recorder.clone()),
        Box::new(io::sink()),
    )
    .run(rx, cancel)
    .await?;

    assert_eq!(recorder.calls(), vec!["stream_start", "stream_end"]);
    assert_eq!(stats.records, 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_while_idle() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    let cancel = CancellationToken::new();
    let sink = SharedBuf::default();
    let handle = Renderer::new(
        Arc::new(StubDecoder),
        OutputFormat::Json.writer(),
        Box::new(sink.clone()),
    )
    .with_poll_interval(Duration::from_millis(20))
    .spawn(rx, cancel.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let (result, _sink) = tokio::time::timeout(Duration::from_secs(1), handle).await??;
    let stats = result?;
    drop(tx);

    assert_eq!(stats.records, 0);
    assert_eq!(serde_json::from_str::<serde_json::Value>(&sink.contents())?, serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn test_sink_failure_is_fatal() {
    let (tx, rx) = record_queue();
    enqueue(&tx, &frame(&KEY, &[1]));
    drop(tx);

    let result = Renderer::new(
        Arc::new(StubDecoder),
        OutputFormat::Text.writer(),
        Box::new(BrokenSink),
    )
    .run(rx, CancellationToken::new())
    .await;
    assert!(matches!(result, Err(WriteError::Io(_))));
}

#[tokio::test]
async fn test_local_set_records_render() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    enqueue(&tx, &local_set(&[(3, b"M1"), (99, &[0x01]), (65, &[0x0b])]));
    drop(tx);

    let sink = SharedBuf::default();
    Renderer::new(
        Arc::new(LocalSetDecoder::default()),
        OutputFormat::Text.writer(),
        Box::new(sink.clone()),
    )
    .run(rx, CancellationToken::new())
    .await?;

    let output = sink.contents();
    assert!(output.contains("\t [3] Mission ID: M1\n"));
    assert!(output.contains("\t [65] UAS Datalink LS Version Number: 11\n"));
    assert!(!output.contains("[99]"));
    Ok(())
}

#[tokio::test]
async fn test_spawned_renderer_hands_back_sink() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    let (sink, dropped) = DropFlag::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let handle = Renderer::new(
        Arc::new(StubDecoder),
        OutputFormat::Text.writer(),
        Box::new(sink),
    )
    .spawn(rx, cancel);
    let (result, sink) = handle.await?;
    result?;
    assert!(!dropped.load(Ordering::SeqCst));

    drop(sink);
    assert!(dropped.load(Ordering::SeqCst));
    drop(tx);
    Ok(())
}

#[tokio::test]
async fn test_malformed_local_set_is_skipped() -> anyhow::Result<()> {
    let (tx, rx) = record_queue();
    // Item 3 declares an indefinite length.
    enqueue(&tx, &frame(&UAS_LOCAL_SET_KEY, &[0x03, 0x80, 0x41]));
    drop(tx);

    let sink = SharedBuf::default();
    let stats = Renderer::new(
        Arc::new(LocalSetDecoder::default()),
        OutputFormat::Json.writer(),
        Box::new(sink.clone()),
    )
    .run(rx, CancellationToken::new())
    .await?;

    assert_eq!(stats.skipped_records, 1);
    assert_eq!(stats.records, 0);
    assert_eq!(sink.contents(), "[\n\n]\n");
    Ok(())
}
