// 오디오 인코더 추상화 - 상태를 가진 스트리밍 AAC 인코더
// configure → encode × N → flush → close 순서로만 구동 (EncodeSession이 보장)

use std::collections::HashMap;

use crate::error::Result;

/// AAC-LC 한 프레임의 샘플 수
pub const AAC_FRAME_SAMPLES: u32 = 1024;

/// 코덱 프로파일 (단일 AAC 계열 프로파일만 지원)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecProfile {
    AacLc,
}

impl CodecProfile {
    /// RFC 6381 코덱 문자열
    pub fn codec_string(&self) -> &'static str {
        match self {
            CodecProfile::AacLc => "mp4a.40.2",
        }
    }

    /// MPEG-4 Audio Object Type
    pub fn audio_object_type(&self) -> u8 {
        match self {
            CodecProfile::AacLc => 2,
        }
    }
}

/// 인코더 설정
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecConfig {
    pub profile: CodecProfile,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

impl CodecConfig {
    pub fn aac_mono(sample_rate: u32, bitrate: u32) -> Self {
        Self { profile: CodecProfile::AacLc, sample_rate, channels: 1, bitrate }
    }
}

/// 디코더 설정 정보 - 컨테이너 esds에 반드시 기록되어야 함
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub profile: CodecProfile,
    /// AudioSpecificConfig 바이트
    pub description: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

/// 인코딩된 프레임 (코덱 출력 단위 1개)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub data: Vec<u8>,
    pub is_sync_point: bool,
}

/// 인코더에 제출하는 PCM 청크
#[derive(Debug, Clone, Copy)]
pub struct AudioChunk<'a> {
    /// interleaved f32 샘플
    pub samples: &'a [f32],
    /// 청크 첫 샘플의 frame 인덱스
    pub frame_offset: u64,
    pub timestamp_us: i64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk<'_> {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// 코덱 지원 여부 확인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecSupport {
    Supported,
    Unsupported(String),
}

impl CodecSupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, CodecSupport::Supported)
    }
}

/// 스트리밍 오디오 인코더
///
/// 출력 프레임은 encode/flush 호출 중 어느 시점에든 `output`에 추가될 수 있음
/// (파이프라인 코덱은 i번째 프레임 출력이 i+1번째 제출 이후에 나올 수 있음)
pub trait AudioEncoder {
    /// 설정 조합 지원 여부 (리소스 할당 없음)
    fn probe(&mut self, config: &CodecConfig) -> CodecSupport;

    /// 인코더 설정 → 디코더 설정 정보 반환
    fn configure(&mut self, config: &CodecConfig) -> Result<DecoderConfig>;

    /// PCM 청크 제출
    fn encode(&mut self, chunk: &AudioChunk<'_>, output: &mut Vec<EncodedFrame>) -> Result<()>;

    /// 제출된 모든 작업의 출력 확정
    fn flush(&mut self, output: &mut Vec<EncodedFrame>) -> Result<()>;

    /// 리소스 해제 (여러 번 호출해도 안전해야 함)
    fn close(&mut self);
}

impl<E: AudioEncoder + ?Sized> AudioEncoder for Box<E> {
    fn probe(&mut self, config: &CodecConfig) -> CodecSupport {
        (**self).probe(config)
    }

    fn configure(&mut self, config: &CodecConfig) -> Result<DecoderConfig> {
        (**self).configure(config)
    }

    fn encode(&mut self, chunk: &AudioChunk<'_>, output: &mut Vec<EncodedFrame>) -> Result<()> {
        (**self).encode(chunk, output)
    }

    fn flush(&mut self, output: &mut Vec<EncodedFrame>) -> Result<()> {
        (**self).flush(output)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// 코덱 지원 여부 캐시 - 호출자가 소유 (전역 상태 아님)
/// 환경이 바뀌었을 수 있으면 invalidate() 후 재확인
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: HashMap<CodecConfig, CodecSupport>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 캐시에 있으면 재사용, 없으면 인코더에 확인
    pub fn check<E: AudioEncoder + ?Sized>(
        &mut self,
        encoder: &mut E,
        config: &CodecConfig,
    ) -> CodecSupport {
        self.entries
            .entry(config.clone())
            .or_insert_with(|| encoder.probe(config))
            .clone()
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

/// MPEG-4 sampling frequency index (ISO/IEC 14496-3 표)
pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    const RATES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];
    RATES.iter().position(|r| *r == sample_rate).map(|i| i as u8)
}

/// 2바이트 AudioSpecificConfig 생성
/// objectType(5) | frequencyIndex(4) | channelConfig(4) | 0(3)
pub fn audio_specific_config(profile: CodecProfile, sample_rate: u32, channels: u16) -> Option<Vec<u8>> {
    let freq_index = sampling_frequency_index(sample_rate)? as u16;
    if channels == 0 || channels > 7 {
        return None;
    }
    let bits = ((profile.audio_object_type() as u16) << 11) | (freq_index << 7) | (channels << 3);
    Some(bits.to_be_bytes().to_vec())
}
