// AAC 인코더 - FFmpeg 기반 (feature "ffmpeg")
// f32 mono PCM → FLTP 프레임(1024 샘플) → AAC-LC raw 패킷

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{sample, Sample};
use log::{debug, warn};

use crate::encoding::encoder::{
    sampling_frequency_index, AudioChunk, AudioEncoder, CodecConfig, CodecSupport,
    DecoderConfig, EncodedFrame, AAC_FRAME_SAMPLES,
};
use crate::error::{EncodeError, Result};
use crate::time::frame_index_to_timestamp_us;

/// FFmpeg AAC 인코더
pub struct FfmpegAacEncoder {
    encoder: Option<ffmpeg::encoder::Audio>,
    sample_rate: u32,
    frame_size: usize,
    /// 프레임 크기에 못 미치는 잔여 샘플
    fifo: Vec<f32>,
    /// 인코더에 보낸 샘플 수 (pts)
    sent_samples: i64,
    /// 출력 패킷이 덮은 샘플 수 (타임스탬프 기준)
    emitted_samples: i64,
}

impl FfmpegAacEncoder {
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| EncodeError::CodecFailure(format!("FFmpeg init failed: {}", e)))?;

        Ok(Self {
            encoder: None,
            sample_rate: 0,
            frame_size: AAC_FRAME_SAMPLES as usize,
            fifo: Vec::new(),
            sent_samples: 0,
            emitted_samples: 0,
        })
    }

    /// 프레임 1개 (frame_size 이하) 전송
    fn send_samples(&mut self, samples: &[f32]) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| EncodeError::CodecFailure("encoder not configured".to_string()))?;

        let mut frame = ffmpeg::frame::Audio::new(
            Sample::F32(sample::Type::Planar),
            samples.len(),
            ffmpeg::ChannelLayout::MONO,
        );
        frame.set_rate(self.sample_rate);
        frame.plane_mut::<f32>(0)[..samples.len()].copy_from_slice(samples);
        frame.set_pts(Some(self.sent_samples));
        self.sent_samples += samples.len() as i64;

        encoder
            .send_frame(&frame)
            .map_err(|e| EncodeError::CodecFailure(format!("Failed to send frame: {}", e)))
    }

    /// 인코더에서 패킷 수신 → EncodedFrame
    /// 타임스탬프는 출력 샘플 누적값 기준 (priming 음수 pts 무시, 간격 없음)
    fn receive_packets(&mut self, output: &mut Vec<EncodedFrame>) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| EncodeError::CodecFailure("encoder not configured".to_string()))?;

        let mut packet = ffmpeg::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            let data = match packet.data() {
                Some(d) if !d.is_empty() => d.to_vec(),
                _ => continue,
            };
            let samples = if packet.duration() > 0 {
                packet.duration()
            } else {
                self.frame_size as i64
            };

            let start = self.emitted_samples;
            let end = start + samples;
            let timestamp_us = frame_index_to_timestamp_us(start, self.sample_rate)?;
            let duration_us = frame_index_to_timestamp_us(end, self.sample_rate)? - timestamp_us;
            self.emitted_samples = end;

            output.push(EncodedFrame {
                timestamp_us,
                duration_us,
                data,
                // AAC-LC 프레임은 모두 독립 디코딩 가능
                is_sync_point: true,
            });
        }
        Ok(())
    }
}

impl AudioEncoder for FfmpegAacEncoder {
    fn probe(&mut self, config: &CodecConfig) -> CodecSupport {
        if config.channels != 1 {
            return CodecSupport::Unsupported(format!("{} channels", config.channels));
        }
        if sampling_frequency_index(config.sample_rate).is_none() {
            return CodecSupport::Unsupported(format!("{}Hz", config.sample_rate));
        }
        match ffmpeg::encoder::find(codec::Id::AAC) {
            Some(_) => CodecSupport::Supported,
            None => CodecSupport::Unsupported("AAC encoder not found".to_string()),
        }
    }

    fn configure(&mut self, config: &CodecConfig) -> Result<DecoderConfig> {
        let aac = ffmpeg::encoder::find(codec::Id::AAC)
            .ok_or_else(|| EncodeError::UnsupportedConfiguration("AAC encoder not found".to_string()))?;

        let mut encoder = codec::context::Context::new_with_codec(aac)
            .encoder()
            .audio()
            .map_err(|e| EncodeError::UnsupportedConfiguration(format!("Failed to get audio encoder: {}", e)))?;

        encoder.set_rate(config.sample_rate as i32);
        encoder.set_channel_layout(ffmpeg::ChannelLayout::MONO);
        encoder.set_format(Sample::F32(sample::Type::Planar));
        encoder.set_bit_rate(config.bitrate as usize);
        encoder.set_time_base(ffmpeg::Rational::new(1, config.sample_rate as i32));

        // 글로벌 헤더 → extradata(AudioSpecificConfig) 생성
        unsafe {
            (*encoder.as_mut_ptr()).flags |= codec::flag::Flags::GLOBAL_HEADER.bits() as i32;
        }

        let encoder = encoder
            .open_as(aac)
            .map_err(|e| EncodeError::UnsupportedConfiguration(format!("Failed to open encoder: {}", e)))?;

        let description = unsafe {
            let ctx = encoder.as_ptr();
            if (*ctx).extradata.is_null() || (*ctx).extradata_size <= 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize).to_vec()
            }
        };

        let frame_size = encoder.frame_size() as usize;
        self.frame_size = if frame_size > 0 { frame_size } else { AAC_FRAME_SAMPLES as usize };
        self.sample_rate = config.sample_rate;
        self.fifo.clear();
        self.sent_samples = 0;
        self.emitted_samples = 0;
        self.encoder = Some(encoder);

        debug!(
            "[AAC] 인코더 열림: frame_size={}, extradata={} bytes",
            self.frame_size,
            description.len()
        );

        Ok(DecoderConfig {
            profile: config.profile,
            description,
            sample_rate: config.sample_rate,
            channels: config.channels,
            bitrate: config.bitrate,
        })
    }

    fn encode(&mut self, chunk: &AudioChunk<'_>, output: &mut Vec<EncodedFrame>) -> Result<()> {
        self.fifo.extend_from_slice(chunk.samples);

        let frame_size = self.frame_size;
        let full = self.fifo.len() / frame_size * frame_size;
        if full == 0 {
            return Ok(());
        }

        let pending: Vec<f32> = self.fifo.drain(..full).collect();
        for frame in pending.chunks(frame_size) {
            self.send_samples(frame)?;
            self.receive_packets(output)?;
        }
        Ok(())
    }

    fn flush(&mut self, output: &mut Vec<EncodedFrame>) -> Result<()> {
        // 잔여 샘플 (마지막 짧은 프레임) 먼저 제출
        if !self.fifo.is_empty() {
            let tail = std::mem::take(&mut self.fifo);
            self.send_samples(&tail)?;
            self.receive_packets(output)?;
        }

        if let Some(encoder) = self.encoder.as_mut() {
            encoder
                .send_eof()
                .map_err(|e| EncodeError::CodecFailure(format!("Failed to send EOF: {}", e)))?;
        }
        self.receive_packets(output)
    }

    fn close(&mut self) {
        if self.encoder.take().is_some() {
            debug!("[AAC] 인코더 해제 ({} samples)", self.sent_samples);
        }
        if !self.fifo.is_empty() {
            warn!("[AAC] 제출되지 않은 샘플 {}개 폐기", self.fifo.len());
            self.fifo.clear();
        }
    }
}
