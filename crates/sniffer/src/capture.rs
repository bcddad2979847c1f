//! 프레임 소스
//!
//! [`FrameSource`]는 스니퍼 스레드가 프레임을 읽어오는 경계입니다.
//! - [`ChannelFrameSource`]: pnet datalink 채널 기반 라이브 캡처
//! - [`ReplayFrameSource`]: 메모리의 프레임 목록을 재생 (테스트, 오프라인 분석)

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver};
use sigwatch_core::types::RawFrame;

use crate::error::CaptureError;

/// 프레임 소스
///
/// `next_frame`은 블로킹 호출이며 읽기 타임아웃이 지나면 `Ok(None)`을 반환해야 합니다.
/// 스니퍼는 호출 사이에 정지 플래그를 확인하므로 타임아웃이 정지 지연의 상한이 됩니다.
pub trait FrameSource: Send {
    /// 다음 프레임을 읽습니다.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;
}

/// pnet datalink 채널 기반 라이브 캡처
pub struct ChannelFrameSource {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
}

impl ChannelFrameSource {
    /// 인터페이스에서 이더넷 채널을 엽니다.
    ///
    /// # Errors
    /// - 인터페이스가 없으면 [`CaptureError::InterfaceNotFound`]
    /// - 권한이 없으면 [`CaptureError::PermissionDenied`]
    pub fn open(interface: &str, read_timeout: Duration) -> Result<Self, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound {
                name: interface.to_owned(),
            })?;

        let config = datalink::Config {
            read_timeout: Some(read_timeout),
            ..Default::default()
        };

        match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => {
                tracing::info!(interface, ?read_timeout, "capture channel opened");
                Ok(Self {
                    interface: interface.to_owned(),
                    rx,
                })
            }
            Ok(_) => Err(CaptureError::UnsupportedChannel {
                interface: interface.to_owned(),
            }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(CaptureError::PermissionDenied {
                    interface: interface.to_owned(),
                })
            }
            Err(e) => Err(CaptureError::Io {
                interface: interface.to_owned(),
                source: e,
            }),
        }
    }

    /// 인터페이스 이름을 반환합니다.
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameSource for ChannelFrameSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.rx.next() {
            Ok(bytes) => Ok(Some(RawFrame::new(bytes.to_vec()))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(CaptureError::Io {
                interface: self.interface.clone(),
                source: e,
            }),
        }
    }
}

/// 메모리 프레임 재생 소스
///
/// 프레임을 모두 내보낸 뒤에는 `idle` 동안 대기하고 `Ok(None)`을 반환합니다.
#[derive(Debug, Default)]
pub struct ReplayFrameSource {
    frames: VecDeque<RawFrame>,
    idle: Duration,
}

impl ReplayFrameSource {
    /// 기본 유휴 대기 시간
    pub const DEFAULT_IDLE: Duration = Duration::from_millis(10);

    /// 바이트열 목록으로 소스를 생성합니다.
    pub fn new<I, B>(frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<bytes::Bytes>,
    {
        Self {
            frames: frames.into_iter().map(RawFrame::new).collect(),
            idle: Self::DEFAULT_IDLE,
        }
    }

    /// 유휴 대기 시간을 설정합니다.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// 남은 프레임 수를 반환합니다.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplayFrameSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => {
                std::thread::sleep(self.idle);
                Ok(None)
            }
        }
    }
}
