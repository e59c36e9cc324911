use bytes::Bytes;
use rand::Rng;

use crate::ChannelBody;

pub(crate) const VIEW_PAYLOAD: &str = r#"{"total_rows":2,"offset":0,"rows":[{"id":"a","key":"a","value":1},{"id":"b","key":"b","value":2}]}"#;

pub(crate) const CHANGES_PAYLOAD: &str =
    r#"{"results":[{"seq":1,"id":"doc1","changes":[{"rev":"1-abc"}]}],"last_seq":"1"}"#;

/// Feeds `payload` through a channel in chunks of `chunk` bytes.
pub(crate) fn chunked_body(payload: impl Into<Vec<u8>>, chunk: usize) -> ChannelBody {
    let payload = payload.into();
    let sizes = std::iter::repeat(chunk).take(payload.len() / chunk + 1).collect();
    send_in_parts(payload, sizes)
}

/// Feeds `payload` through a channel in chunks of random size.
pub(crate) fn randomly_chunked_body(payload: impl Into<Vec<u8>>) -> ChannelBody {
    let payload = payload.into();
    let mut rng = rand::thread_rng();
    let mut sizes = Vec::new();
    let mut total = 0;
    while total < payload.len() {
        let size = rng.gen_range(1..64);
        sizes.push(size);
        total += size;
    }
    send_in_parts(payload, sizes)
}

fn send_in_parts(payload: Vec<u8>, sizes: Vec<usize>) -> ChannelBody {
    let (tx, body) = ChannelBody::channel(16);
    tokio::spawn(async move {
        let mut rest = &payload[..];
        for size in sizes {
            if rest.is_empty() {
                break;
            }
            let (part, tail) = rest.split_at(size.min(rest.len()));
            rest = tail;
            if tx.send(Bytes::copy_from_slice(part)).await.is_err() {
                break;
            }
        }
    });
    body
}

pub(crate) fn view_payload_with_rows(count: usize) -> String {
    let rows: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"id":"doc-{i}","key":[{i},"k\"{i}"],"value":{{"n":{i},"text":"]}}{{"}}}}"#))
        .collect();
    format!(
        r#"{{"total_rows":{count},"offset":0,"update_seq":"{count}-abc","rows":[{}]}}"#,
        rows.join(",\n")
    )
}
