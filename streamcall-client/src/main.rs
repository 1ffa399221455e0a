//
// License CC0: https://creativecommons.org/publicdomain/zero/1.0/
//

#![deny(clippy::pedantic)]

mod http;

use std::{
    fs::File,
    io::{self, Write},
    ops::ControlFlow,
    path::PathBuf,
};

use log::{debug, info, warn};
use streamcall::{
    read_stream, BodyReader, Call, Error, MockTransport, NdjsonFactory, RawFactory, ReaderSource,
    Response, Transport,
};
use structopt::StructOpt;
use tokio_util::compat::TokioAsyncReadCompatExt;

use crate::http::ReqwestTransport;

type Res<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "streamcall-client",
    about = "Stream records to an HTTP endpoint while the request is in flight."
)]
struct Args {
    /// The URL to send the request to.
    url: String,

    /// The request method.
    #[structopt(long, short = "m", default_value = "POST")]
    method: String,

    /// The content type of the request body.
    #[structopt(long, short = "t", default_value = "application/x-ndjson")]
    content_type: String,

    /// Where to read request content.
    /// If you omit this, input is read from `stdin`.
    #[structopt(long, short = "i")]
    input: Option<PathBuf>,

    /// Where to write response content.
    /// If you omit this, output is written to `stdout`.
    #[structopt(long, short = "o")]
    output: Option<PathBuf>,

    /// Send input in fixed-size chunks instead of line by line.
    #[structopt(long, short = "r")]
    raw: bool,

    /// The size of chunks sent with `--raw`.
    #[structopt(long, default_value = "4096")]
    chunk_size: usize,

    /// Additional header fields, each as `name: value`.
    #[structopt(long = "header", short = "H")]
    headers: Vec<String>,

    /// Fail unless the response has one of these status codes.
    #[structopt(long = "expect", short = "e")]
    expect: Vec<u16>,

    /// Decode the response as NDJSON, writing each document on its own line.
    #[structopt(long, short = "j")]
    ndjson: bool,

    /// Don't use the network; answer with the request body instead.
    #[structopt(long)]
    dry_run: bool,

    /// Enable override for the trust store.
    #[structopt(long)]
    trust: Option<PathBuf>,
}

async fn open_input(args: &Args) -> Res<BodyReader> {
    Ok(if let Some(infile) = &args.input {
        Box::new(tokio::fs::File::open(infile).await?.compat())
    } else {
        Box::new(tokio::io::stdin().compat())
    })
}

fn open_output(args: &Args) -> Res<Box<dyn Write + Send>> {
    Ok(if let Some(outfile) = &args.output {
        Box::new(File::create(outfile)?)
    } else {
        Box::new(io::stdout())
    })
}

fn build_call(args: &Args) -> Res<Call> {
    let mut call = Call::new(&args.method, &args.url)?.content_type(&args.content_type);
    for h in &args.headers {
        let (name, value) = h
            .split_once(':')
            .ok_or_else(|| format!("header {h:?} is not in the form `name: value`"))?;
        call = call.header(name.trim(), value.trim(), false);
    }
    if !args.expect.is_empty() {
        call = call.expect_status(&args.expect);
    }
    Ok(call.sniffer(|chunk: &[u8], err: Option<&Error>| match err {
        Some(e) => warn!("failed to send {} bytes: {e}", chunk.len()),
        None => debug!("sent {} bytes", chunk.len()),
    }))
}

async fn run<T: Transport>(args: &Args, transport: &T) -> Res<()> {
    let input = open_input(args).await?;
    let source = if args.raw {
        ReaderSource::raw(input, args.chunk_size)
    } else {
        ReaderSource::lines(input)
    };
    let mut res = build_call(args)?
        .stream_body(source)
        .execute(transport)
        .await?;
    info!("response status {}", res.status());

    let body = res.take_body();
    let mut out = open_output(args)?;
    let mut write_err = None;
    if args.ndjson {
        read_stream(
            body,
            &NdjsonFactory::<serde_json::Value>::new(),
            |v| match writeln!(out, "{v}") {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    write_err = Some(e);
                    ControlFlow::Break(())
                }
            },
        )
        .await?;
    } else {
        read_stream(body, &RawFactory::default(), |chunk| {
            match out.write_all(&chunk) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    write_err = Some(e);
                    ControlFlow::Break(())
                }
            }
        })
        .await?;
    }
    if let Some(e) = write_err {
        return Err(e.into());
    }
    out.flush()?;
    Ok(())
}

fn client(args: &Args) -> Res<reqwest::Client> {
    let builder = reqwest::ClientBuilder::new();
    Ok(match &args.trust {
        Some(pem) => {
            let buf = std::fs::read(pem)?;
            let cert = reqwest::Certificate::from_pem(&buf)?;
            builder.add_root_certificate(cert).build()?
        }
        None => builder.build()?,
    })
}

#[tokio::main]
async fn main() -> Res<()> {
    let args = Args::from_args();
    env_logger::try_init()?;

    if args.dry_run {
        run(&args, &MockTransport::echo()).await
    } else {
        run(&args, &ReqwestTransport::new(client(&args)?)).await
    }
}
