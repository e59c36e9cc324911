#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::Bytes;
    use simd_json::{json, OwnedValue};

    use crate::tests::support::chunked_body;
    use crate::{ChannelBody, JsonTokenReader, ReaderConfig, ReaderError, TokenKind};

    fn reader(payload: &str) -> JsonTokenReader<Cursor<Vec<u8>>> {
        JsonTokenReader::new(Cursor::new(payload.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn test_walks_every_token_kind() {
        let mut reader = reader(r#"{"a": [1, "two", true, null], "b": {"c": -1.5e3}}"#);
        reader.begin_object().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "a");
        reader.begin_array().await.unwrap();
        assert_eq!(reader.peek().await.unwrap(), TokenKind::Number);
        assert_eq!(reader.next_i64().await.unwrap(), 1);
        assert_eq!(reader.next_string().await.unwrap(), "two");
        assert!(reader.next_bool().await.unwrap());
        assert_eq!(reader.peek().await.unwrap(), TokenKind::Null);
        reader.next_null().await.unwrap();
        assert!(!reader.has_next().await.unwrap());
        reader.end_array().await.unwrap();

        assert_eq!(reader.next_name().await.unwrap(), "b");
        reader.begin_object().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "c");
        assert_eq!(reader.next_scalar_text().await.unwrap(), "-1.5e3");
        assert!(!reader.has_next().await.unwrap());
        reader.end_object().await.unwrap();
        reader.end_object().await.unwrap();
        assert_eq!(reader.peek().await.unwrap(), TokenKind::EndDocument);
    }

    #[tokio::test]
    async fn test_empty_containers() {
        let mut reader = reader(r#"{"a":[],"b":{}}"#);
        reader.begin_object().await.unwrap();
        reader.next_name().await.unwrap();
        reader.begin_array().await.unwrap();
        assert!(!reader.has_next().await.unwrap());
        reader.end_array().await.unwrap();
        reader.next_name().await.unwrap();
        reader.begin_object().await.unwrap();
        assert!(!reader.has_next().await.unwrap());
        reader.end_object().await.unwrap();
        reader.end_object().await.unwrap();
        assert_eq!(reader.position(), 15);
    }

    #[tokio::test]
    async fn test_skip_and_read_value_with_single_byte_chunks() {
        let payload = r#"{"skip": {"nested": [1, {"x": "}]"}]}, "keep": {"s": "a\"b", "n": 7}}"#;
        let mut reader = JsonTokenReader::new(chunked_body(payload, 1));
        reader.begin_object().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "skip");
        reader.skip_value().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "keep");
        let value = reader.read_value().await.unwrap();
        assert_eq!(value, OwnedValue::from(json!({"s": "a\"b", "n": 7})));
        reader.end_object().await.unwrap();
        assert_eq!(reader.peek().await.unwrap(), TokenKind::EndDocument);
    }

    #[tokio::test]
    async fn test_string_escapes_split_across_chunks() {
        let payload = r#"["x\"y", "café", "tab\tend", "plain"]"#;
        let mut reader = JsonTokenReader::new(chunked_body(payload, 1));
        reader.begin_array().await.unwrap();
        assert_eq!(reader.next_string().await.unwrap(), "x\"y");
        assert_eq!(reader.next_string().await.unwrap(), "café");
        assert_eq!(reader.next_string().await.unwrap(), "tab\tend");
        assert_eq!(reader.next_string().await.unwrap(), "plain");
        reader.end_array().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_raw_value_returns_exact_bytes() {
        let mut reader = reader(r#"[{"a":1} , 2]"#);
        reader.begin_array().await.unwrap();
        let raw = reader.read_raw_value().await.unwrap();
        assert_eq!(&raw[..], br#"{"a":1}"#);
        assert_eq!(reader.next_i64().await.unwrap(), 2);
        reader.end_array().await.unwrap();
    }

    #[tokio::test]
    async fn test_integer_spelled_as_string() {
        let mut reader = reader(r#"["42", 7]"#);
        reader.begin_array().await.unwrap();
        assert_eq!(reader.next_i64().await.unwrap(), 42);
        assert_eq!(reader.next_scalar_text().await.unwrap(), "7");
    }

    #[tokio::test]
    async fn test_missing_colon_reports_offset() {
        let mut reader = reader(r#"{"a" 1}"#);
        reader.begin_object().await.unwrap();
        reader.next_name().await.unwrap();
        match reader.next_i64().await {
            Err(ReaderError::Syntax { offset, .. }) => assert_eq!(offset, 5),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trailing_data_is_rejected() {
        let mut reader = reader("{} x");
        reader.begin_object().await.unwrap();
        reader.end_object().await.unwrap();
        assert!(matches!(
            reader.peek().await,
            Err(ReaderError::Syntax { offset: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_input_is_incomplete() {
        let mut reader = reader(r#"{"a": [1, 2"#);
        reader.begin_object().await.unwrap();
        reader.next_name().await.unwrap();
        reader.begin_array().await.unwrap();
        assert_eq!(reader.next_i64().await.unwrap(), 1);
        assert_eq!(reader.next_i64().await.unwrap(), 2);
        assert!(matches!(
            reader.has_next().await,
            Err(ReaderError::IncompleteData(_))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_token_kind() {
        let mut reader = reader("[1]");
        match reader.begin_object().await {
            Err(ReaderError::UnexpectedToken {
                expected,
                found,
                offset,
            }) => {
                assert_eq!(expected, TokenKind::Object);
                assert_eq!(found, TokenKind::Array);
                assert_eq!(offset, 0);
            }
            other => panic!("expected an unexpected token error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_object_rejects_scalars() {
        let mut reader = reader("[1]");
        reader.begin_array().await.unwrap();
        assert!(matches!(
            reader.read_object().await,
            Err(ReaderError::UnexpectedToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_reader_fails() {
        let mut reader = reader("[1, 2]");
        reader.begin_array().await.unwrap();
        reader.close();
        assert!(reader.is_closed());
        assert!(matches!(reader.has_next().await, Err(ReaderError::Closed)));
    }

    #[tokio::test]
    async fn test_value_larger_than_limit() {
        let payload = format!(r#"[{{"big":"{}"}}]"#, "x".repeat(10_000));
        let config = ReaderConfig {
            buffer_size: 64,
            max_buffer_size: 1024,
            ..Default::default()
        };
        let mut reader = JsonTokenReader::with_config(chunked_body(payload, 100), config);
        reader.begin_array().await.unwrap();
        assert!(matches!(
            reader.read_value().await,
            Err(ReaderError::ValueTooLarge(1024))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (tx, body) = ChannelBody::channel(4);
        tx.send(Bytes::from_static(br#"{"a":"#)).await.unwrap();
        let config = ReaderConfig {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut reader = JsonTokenReader::with_config(body, config);
        reader.begin_object().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "a");
        assert!(matches!(reader.next_i64().await, Err(ReaderError::Timeout)));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_timeout() {
        let (tx, body) = ChannelBody::channel(4);
        tx.send(Bytes::from_static(br#"{"rows":["#)).await.unwrap();
        let config = ReaderConfig {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut reader = JsonTokenReader::with_config(body, config);
        reader.begin_object().await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "rows");
        reader.begin_array().await.unwrap();
        assert!(matches!(reader.has_next().await, Err(ReaderError::Timeout)));

        tx.send(Bytes::from_static(br#"{"id":"a"} ,"#)).await.unwrap();
        assert!(reader.has_next().await.unwrap());
        reader.read_object().await.unwrap();
        assert!(matches!(reader.has_next().await, Err(ReaderError::Timeout)));

        tx.send(Bytes::from_static(br#" {"id":"b"}]}"#)).await.unwrap();
        assert!(reader.has_next().await.unwrap());
        let row = reader.read_object().await.unwrap();
        assert_eq!(row, OwnedValue::from(json!({"id": "b"})));
        assert!(!reader.has_next().await.unwrap());
        reader.end_array().await.unwrap();
        reader.end_object().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_name_retry_after_timeout() {
        let (tx, body) = ChannelBody::channel(4);
        tx.send(Bytes::from_static(br#"{"a":1,"#)).await.unwrap();
        let config = ReaderConfig {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut reader = JsonTokenReader::with_config(body, config);
        reader.begin_object().await.unwrap();
        reader.next_name().await.unwrap();
        assert_eq!(reader.next_i64().await.unwrap(), 1);
        assert!(matches!(reader.has_next().await, Err(ReaderError::Timeout)));
        tx.send(Bytes::from_static(br#""b":2}"#)).await.unwrap();
        assert_eq!(reader.next_name().await.unwrap(), "b");
        assert_eq!(reader.next_i64().await.unwrap(), 2);
        reader.end_object().await.unwrap();
    }

    #[tokio::test]
    async fn test_skipped_values_must_be_well_formed() {
        for payload in [r#"{"junk":nope}"#, r#"{"junk":[1,}}"#, r#"{"junk":tru}"#] {
            let mut reader = reader(payload);
            reader.begin_object().await.unwrap();
            reader.next_name().await.unwrap();
            assert!(
                reader.skip_value().await.is_err(),
                "{payload} should not be skipped"
            );
        }

        let mut reader = reader(r#"{"ok":[1,{"x":null}],"n":-2.5}"#);
        reader.begin_object().await.unwrap();
        reader.next_name().await.unwrap();
        reader.skip_value().await.unwrap();
        reader.next_name().await.unwrap();
        reader.skip_value().await.unwrap();
        reader.end_object().await.unwrap();
    }
}
