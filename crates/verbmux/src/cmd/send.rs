use std::fs;
use std::time::Duration;

use tokio::sync::mpsc;
use verbmux_peer::{Client, Header, PeerError, Request, Response};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_response, OutputFormat};

type Reply = Result<Response, String>;

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let header = parse_headers(&args.header)?;
    let body = resolve_body(&args)?;

    let client = Client::dial(&args.url, &[])
        .await
        .map_err(|err| peer_error("connect failed", err))?;

    let mut replies = args.wait.then(|| subscribe(&client));

    if let Some(path) = &args.file {
        let mut file = fs::File::open(path)
            .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
        let sent = client
            .send_from(&args.verb, header, &mut file)
            .await
            .map_err(|err| peer_error("send failed", err))?;
        tracing::debug!(verb = %args.verb, bytes = sent, "request streamed from file");
    } else {
        let mut req = Request::new(args.verb.as_str(), body);
        req.header = header;
        client
            .execute(&req)
            .await
            .map_err(|err| peer_error("send failed", err))?;
    }

    let mut code = SUCCESS;
    if let Some(rx) = replies.as_mut() {
        let resp = wait_for_response(rx, wait_timeout).await?;
        if resp.is_error() {
            code = FAILURE;
        }
        print_response(&resp, client.id(), format);
    }

    client.close();
    let _ = tokio::time::timeout(wait_timeout, client.closed()).await;
    Ok(code)
}

/// Route the first response, or the first failure, into a channel.
fn subscribe(client: &Client) -> mpsc::UnboundedReceiver<Reply> {
    let (tx, rx) = mpsc::unbounded_channel();
    let ok = tx.clone();
    client.on_any(move |resp| {
        let _ = ok.send(Ok(resp.clone()));
    });
    client.on_error(move |err| {
        let reply = match err {
            PeerError::Remote { status, message } => Ok(Response::error(message.clone(), *status)),
            other => Err(other.to_string()),
        };
        let _ = tx.send(reply);
    });
    rx
}

async fn wait_for_response(
    rx: &mut mpsc::UnboundedReceiver<Reply>,
    timeout: Duration,
) -> CliResult<Response> {
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(Ok(resp))) => Ok(resp),
        Ok(Some(Err(message))) => Err(CliError::new(
            DATA_INVALID,
            format!("receive failed: {message}"),
        )),
        Ok(None) => Err(CliError::new(
            FAILURE,
            "connection closed before a response arrived",
        )),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("no response within {timeout:?}"),
        )),
    }
}

fn resolve_body(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    // --file bodies are streamed at send time.
    Ok(Vec::new())
}

fn parse_headers(pairs: &[String]) -> CliResult<Header> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(CliError::new(
                USAGE,
                format!("invalid header {pair:?}, expected KEY=VALUE"),
            )),
        })
        .collect()
}
