use std::sync::Arc;

use bytes::Bytes;
use couch_stream::{ChannelBody, SimdJsonDecoder, StreamingViewResult};
use serde::Deserialize;
use tokio::time::{sleep, Duration};
use tokio_stream::StreamExt;

#[derive(Debug, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Simulates a slow server sending a view response in small pieces.
    let (tx, body) = ChannelBody::channel(8);
    tokio::spawn(async move {
        let response = r#"{"total_rows":3,"offset":0,"rows":[
            {"id":"p1","key":"alice","value":{"name":"Alice","age":30}},
            {"id":"p2","key":"bob","value":{"name":"Bob","age":25}},
            {"id":"p3","key":"carol","value":{"name":"Carol","age":41}}
        ]}"#;
        for part in response.as_bytes().chunks(24) {
            if tx.send(Bytes::copy_from_slice(part)).await.is_err() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    });

    let mut result = StreamingViewResult::new(Arc::new(SimdJsonDecoder), body).await?;
    println!("total rows: {}", result.total_rows());

    {
        let rows = result.iterator()?.into_stream();
        tokio::pin!(rows);
        while let Some(row) = rows.next().await {
            let row = row?;
            let person: Option<Person> = row.value_as()?;
            println!("{:?} -> {:?}", row.key(), person);
        }
    }
    result.close();
    Ok(())
}
