// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! NVR Client (C3): one digest-authenticated HTTP request per NVR, parsing
//! the Hikvision ISAPI channel-status document.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::models::Nvr;

/// One polled channel's reported state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel_id: String,
    pub camera_ip: String,
    pub online: bool,
}

/// Outcome of polling a single NVR.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Ok(Vec<ChannelStatus>),
    Fail(String),
}

/// Issues digest-authenticated status polls against Hikvision-compatible NVRs.
///
/// A dedicated client with proxying disabled is used, since NVRs live on the
/// local network and must never be routed through an ambient HTTP(S) proxy.
#[derive(Clone)]
pub struct NvrClient {
    http: Client,
    timeout: Duration,
}

impl NvrClient {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");
        Self { http, timeout }
    }

    /// Poll one NVR's channel-status endpoint, performing the digest
    /// authentication handshake if challenged.
    pub async fn poll(&self, nvr: &Nvr) -> PollOutcome {
        let url = format!("http://{}/ISAPI/ContentMgmt/InputProxy/channels/status", nvr.ip);
        match self.poll_inner(nvr, &url).await {
            Ok(channels) => PollOutcome::Ok(channels),
            Err(reason) => PollOutcome::Fail(reason),
        }
    }

    async fn poll_inner(&self, nvr: &Nvr, url: &str) -> Result<Vec<ChannelStatus>, String> {
        let first = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let response = if first.status() == reqwest::StatusCode::UNAUTHORIZED {
            let www_auth = first
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| "401 without WWW-Authenticate header".to_string())?;

            let context = digest_auth::AuthContext::new_with_method(
                &nvr.user,
                nvr.password.as_deref().unwrap_or(""),
                "/ISAPI/ContentMgmt/InputProxy/channels/status",
                Option::<&'static [u8]>::None,
                digest_auth::HttpMethod::GET,
            );

            let mut prompt =
                digest_auth::WwwAuthenticateHeader::parse(www_auth).map_err(|e| e.to_string())?;
            let authorization = prompt.respond(&context).map_err(|e| e.to_string())?.to_string();

            self.http
                .get(url)
                .timeout(self.timeout)
                .header(reqwest::header::AUTHORIZATION, authorization)
                .send()
                .await
                .map_err(|e| e.to_string())?
        } else {
            first
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {status}"));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        parse_channel_status(&body)
    }
}

/// Parse the `InputProxyChannelStatus` document described in the ISAPI
/// contract. Unknown elements are ignored; a channel missing `id` or `online`
/// is skipped rather than aborting the whole document.
fn parse_channel_status(xml: &str) -> Result<Vec<ChannelStatus>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut channels = Vec::new();
    let mut buf = Vec::new();

    let mut in_channel = false;
    let mut in_source_port = false;
    let mut current_tag: Option<String> = None;

    let mut channel_id: Option<String> = None;
    let mut online: Option<bool> = None;
    let mut camera_ip: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e.name().as_ref().to_vec());
                match name.as_str() {
                    "InputProxyChannelStatus" => {
                        in_channel = true;
                        channel_id = None;
                        online = None;
                        camera_ip = None;
                    }
                    "sourceInputPortDescriptor" if in_channel => in_source_port = true,
                    _ => {}
                }
                current_tag = Some(name);
            }
            Event::Text(t) => {
                if let Some(tag) = &current_tag {
                    let text = t.unescape().map_err(|e| e.to_string())?.trim().to_string();
                    if in_channel && !in_source_port && tag == "id" {
                        channel_id = Some(text);
                    } else if in_channel && !in_source_port && tag == "online" {
                        online = Some(text.eq_ignore_ascii_case("true"));
                    } else if in_source_port && tag == "ipAddress" {
                        camera_ip = Some(text);
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(&e.name().as_ref().to_vec());
                match name.as_str() {
                    "sourceInputPortDescriptor" => in_source_port = false,
                    "InputProxyChannelStatus" => {
                        if let (Some(id), Some(online)) = (channel_id.take(), online.take()) {
                            channels.push(ChannelStatus {
                                channel_id: id,
                                camera_ip: camera_ip.take().unwrap_or_else(|| "0.0.0.0".to_string()),
                                online,
                            });
                        }
                        in_channel = false;
                    }
                    _ => {}
                }
                current_tag = None;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(channels)
}

/// Strip a namespace prefix (`ns:id` -> `id`) since the ISAPI document is
/// declared under a single default/aliased namespace we don't need to
/// validate strictly.
fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    match s.split_once(':') {
        Some((_, local)) => local.to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<InputProxyChannelStatusList xmlns="http://www.hikvision.com/ver20/XMLSchema">
<InputProxyChannelStatus>
<id>1</id>
<online>true</online>
<sourceInputPortDescriptor>
<ipAddress>10.0.0.5</ipAddress>
</sourceInputPortDescriptor>
</InputProxyChannelStatus>
<InputProxyChannelStatus>
<id>2</id>
<online>false</online>
</InputProxyChannelStatus>
</InputProxyChannelStatusList>"#;

    #[test]
    fn parses_multiple_channels_with_and_without_port_descriptor() {
        let channels = parse_channel_status(SAMPLE).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_id, "1");
        assert!(channels[0].online);
        assert_eq!(channels[0].camera_ip, "10.0.0.5");

        assert_eq!(channels[1].channel_id, "2");
        assert!(!channels[1].online);
        assert_eq!(channels[1].camera_ip, "0.0.0.0");
    }

    #[test]
    fn empty_channel_list_parses_to_empty_vec() {
        let xml = r#"<InputProxyChannelStatusList xmlns="http://www.hikvision.com/ver20/XMLSchema"></InputProxyChannelStatusList>"#;
        let channels = parse_channel_status(xml).unwrap();
        assert!(channels.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_failure_not_a_panic() {
        let result = parse_channel_status("<InputProxyChannelStatusList><a></b></InputProxyChannelStatusList>");
        assert!(result.is_err());
    }
}
