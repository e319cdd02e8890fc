use std::io;
use std::io::ErrorKind;
use std::result::Result;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures::io::Lines;
use futures::stream::IntoAsyncRead;
use futures::stream::MapErr;
use futures::AsyncBufReadExt;
use futures::Stream;
use futures::TryStreamExt;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub fn build_client(timeout: Duration, proxy: Option<&str>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .connection_verbose(false);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy, url={proxy}"))?;
        builder = builder.proxy(proxy);
    }
    builder.build().context("failed to build http client")
}

type BytesResult = Result<Bytes, reqwest::Error>;
pub trait ResponseExt {
    fn lines(
        self,
    ) -> Lines<IntoAsyncRead<MapErr<impl Stream<Item = BytesResult>, impl FnMut(reqwest::Error) -> io::Error>>>;
}

impl ResponseExt for reqwest::Response {
    fn lines(
        self,
    ) -> Lines<IntoAsyncRead<MapErr<impl Stream<Item = BytesResult>, impl FnMut(reqwest::Error) -> io::Error>>> {
        self.bytes_stream()
            .map_err(|e| io::Error::new(ErrorKind::Other, e))
            .into_async_read()
            .lines()
    }
}
