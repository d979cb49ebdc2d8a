// MP4 먹서 - 인코딩된 AAC 프레임 + 챕터 → 오디오북 컨테이너 (메모리 버퍼)
// 구조: ftyp → moov(mvhd, 오디오 trak, [챕터 trak], [udta/chpl]) → mdat
// moov 크기를 먼저 구한 뒤 chunk offset(co64)을 채우는 2-pass

use log::{debug, info};

use crate::encoding::{DecoderConfig, EncodedAudio, EncodedFrame};
use crate::error::{EncodeError, Result};
use crate::mux::boxes::{descriptor_length, BoxWriter};
use crate::time::{microseconds_to_timescale_units, scale_round, MICROS_PER_SECOND};
use crate::timeline::ChapterBoundary;

pub const MIME_TYPE: &str = "audio/mp4";

const AUDIO_TRACK_ID: u32 = 1;
const CHAPTER_TRACK_ID: u32 = 2;

/// 언어 코드 'und' (ISO-639-2/T packed)
const LANGUAGE_UND: u16 = 0x55C4;

/// tkhd flags
const TRACK_ENABLED: u32 = 0x01;
const TRACK_IN_MOVIE: u32 = 0x02;

/// 먹싱 결과 - 다운로드용 불변 바이트 버퍼
#[derive(Debug, Clone)]
pub struct ContainerOutput {
    bytes: Vec<u8>,
    duration_us: i64,
    has_chapters: bool,
}

impl ContainerOutput {
    pub fn bytes(&self) -> &[u8] { &self.bytes }
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }
    pub fn len(&self) -> usize { self.bytes.len() }
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
    pub fn duration_us(&self) -> i64 { self.duration_us }
    pub fn has_chapters(&self) -> bool { self.has_chapters }
    pub fn mime_type(&self) -> &'static str { MIME_TYPE }

    /// 챕터가 있으면 오디오북 확장자
    pub fn file_extension(&self) -> &'static str {
        if self.has_chapters { "m4b" } else { "m4a" }
    }
}

/// 먹서 옵션
#[derive(Debug, Clone, Copy)]
pub struct MuxOptions {
    /// 오디오 chunk 하나에 묶을 샘플 수
    pub samples_per_chunk: u32,
    /// udta/chpl (Nero) 챕터 추가 기록
    pub write_nero_chapters: bool,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self { samples_per_chunk: 44, write_nero_chapters: true }
    }
}

/// 샘플 테이블 항목 (timescale 단위)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    pub duration: u32,
    pub decode_time: u64,
    /// 오디오는 재정렬이 없으므로 decode_time과 동일
    pub presentation_time: u64,
    pub size: u32,
    pub is_sync: bool,
}

/// 트랙 하나의 샘플 + chunk 배치
struct TrackLayout {
    samples: Vec<SampleEntry>,
    /// chunk별 샘플 수
    chunk_sizes: Vec<u32>,
    /// mdat payload 기준 chunk 시작 위치
    chunk_offsets: Vec<u64>,
    duration: u64,
}

impl TrackLayout {
    fn new(samples: Vec<SampleEntry>, samples_per_chunk: u32, payload_start: u64) -> Self {
        let per_chunk = samples_per_chunk.max(1) as usize;
        let mut chunk_sizes = Vec::new();
        let mut chunk_offsets = Vec::new();
        let mut offset = payload_start;

        for group in samples.chunks(per_chunk) {
            chunk_sizes.push(group.len() as u32);
            chunk_offsets.push(offset);
            offset += group.iter().map(|s| s.size as u64).sum::<u64>();
        }

        let duration = samples.iter().map(|s| s.duration as u64).sum();
        Self { samples, chunk_sizes, chunk_offsets, duration }
    }

    fn payload_len(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// 프레임 → 샘플 테이블 (프레임당 1항목)
/// duration은 반올림 변환 (최소 1 tick), decode_time은 duration 누적
pub fn build_sample_table(frames: &[EncodedFrame], timescale: u32) -> Result<Vec<SampleEntry>> {
    let mut decode_time = 0u64;
    let mut entries = Vec::with_capacity(frames.len());

    for (i, frame) in frames.iter().enumerate() {
        let duration = microseconds_to_timescale_units(frame.duration_us, timescale);
        let duration = u32::try_from(duration).map_err(|_| {
            EncodeError::MuxingFailure(format!("frame {} duration out of range", i))
        })?;
        let size = u32::try_from(frame.data.len()).map_err(|_| {
            EncodeError::MuxingFailure(format!("frame {} too large", i))
        })?;

        entries.push(SampleEntry {
            duration,
            decode_time,
            presentation_time: decode_time,
            size,
            is_sync: frame.is_sync_point,
        });
        decode_time += duration as u64;
    }

    Ok(entries)
}

/// 챕터 텍스트 샘플: u16 BE 길이 + UTF-8 제목 + encd(UTF-8) atom
pub fn chapter_sample_payload(title: &str) -> Vec<u8> {
    let title = title.as_bytes();
    let len = title.len().min(u16::MAX as usize);
    let mut payload = Vec::with_capacity(2 + len + 12);
    payload.extend_from_slice(&(len as u16).to_be_bytes());
    payload.extend_from_slice(&title[..len]);
    // encd: 텍스트 인코딩 = UTF-8 (0x00000100)
    payload.extend_from_slice(&12u32.to_be_bytes());
    payload.extend_from_slice(b"encd");
    payload.extend_from_slice(&0x0000_0100u32.to_be_bytes());
    payload
}

/// 챕터 → 샘플 테이블 (오디오 timescale, 0부터 빈틈없이 이어짐)
fn build_chapter_table(
    chapters: &[ChapterBoundary],
    payloads: &[Vec<u8>],
    timescale: u32,
    total_ticks: u64,
) -> Vec<SampleEntry> {
    let starts: Vec<u64> = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            // 첫 챕터는 0부터 (앞부분을 덮도록 늘림)
            if i == 0 {
                0
            } else {
                scale_round(c.start_us, timescale as i64, MICROS_PER_SECOND) as u64
            }
        })
        .collect();

    let mut entries = Vec::with_capacity(chapters.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(total_ticks).max(*start + 1);
        entries.push(SampleEntry {
            duration: (end - start).min(u32::MAX as u64) as u32,
            decode_time: *start,
            presentation_time: *start,
            size: payloads[i].len() as u32,
            is_sync: true,
        });
    }
    entries
}

/// 인코딩 결과 + 챕터 → MP4 바이트
/// - on_progress: 0.0 ~ 1.0
pub fn mux(
    audio: &EncodedAudio,
    chapters: &[ChapterBoundary],
    options: &MuxOptions,
    on_progress: &mut dyn FnMut(f64),
) -> Result<ContainerOutput> {
    if audio.frames.is_empty() {
        return Err(EncodeError::MuxingFailure("no encoded frames to mux".to_string()));
    }
    if audio.decoder_config.description.is_empty() {
        return Err(EncodeError::MuxingFailure(
            "missing decoder configuration description".to_string(),
        ));
    }
    if let Some(i) = audio.frames.iter().position(|f| f.data.is_empty()) {
        return Err(EncodeError::MuxingFailure(format!("frame {} has zero-length payload", i)));
    }

    // 코덱 샘플레이트 = timescale (고정 프레임 크기가 정확히 정수 tick)
    let timescale = audio.decoder_config.sample_rate;
    let audio_samples = build_sample_table(&audio.frames, timescale)?;
    on_progress(0.2);

    let with_chapters = chapters.len() >= 2;
    let chapter_payloads: Vec<Vec<u8>> = if with_chapters {
        chapters.iter().map(|c| chapter_sample_payload(&c.title)).collect()
    } else {
        Vec::new()
    };

    let audio_layout = TrackLayout::new(audio_samples, options.samples_per_chunk, 0);
    let chapter_layout = if with_chapters {
        let entries = build_chapter_table(chapters, &chapter_payloads, timescale, audio_layout.duration);
        // 챕터 샘플은 하나의 chunk (오디오 데이터 뒤)
        let count = entries.len() as u32;
        Some(TrackLayout::new(entries, count, audio_layout.payload_len()))
    } else {
        None
    };

    let payload_len = audio_layout.payload_len()
        + chapter_layout.as_ref().map_or(0, |c| c.payload_len());
    if payload_len == 0 {
        return Err(EncodeError::MuxingFailure("zero-byte media payload".to_string()));
    }

    let ftyp = write_ftyp(with_chapters)?;
    let mdat_header_len: u64 = if payload_len + 8 > u32::MAX as u64 { 16 } else { 8 };

    // pass 1: moov 크기 측정 → pass 2: 실제 offset으로 재작성
    let moov_probe = write_moov(audio, chapters, &audio_layout, chapter_layout.as_ref(), 0, options)?;
    let base = ftyp.len() as u64 + moov_probe.len() as u64 + mdat_header_len;
    let moov = write_moov(audio, chapters, &audio_layout, chapter_layout.as_ref(), base, options)?;
    if moov.len() != moov_probe.len() {
        return Err(EncodeError::MuxingFailure("moov size changed between passes".to_string()));
    }
    on_progress(0.6);

    let total_len = base + payload_len;
    let mut bytes = Vec::with_capacity(total_len as usize);
    bytes.extend_from_slice(&ftyp);
    bytes.extend_from_slice(&moov);
    if mdat_header_len == 16 {
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&(payload_len + 16).to_be_bytes());
    } else {
        bytes.extend_from_slice(&((payload_len + 8) as u32).to_be_bytes());
        bytes.extend_from_slice(b"mdat");
    }
    for frame in &audio.frames {
        bytes.extend_from_slice(&frame.data);
    }
    for payload in &chapter_payloads {
        bytes.extend_from_slice(payload);
    }
    on_progress(0.9);

    if bytes.len() as u64 != total_len {
        return Err(EncodeError::MuxingFailure(format!(
            "output length {} does not match layout {}",
            bytes.len(),
            total_len
        )));
    }
    if bytes.is_empty() || bytes.iter().all(|b| *b == 0) {
        return Err(EncodeError::MuxingFailure("empty container output".to_string()));
    }

    let duration_us = audio.total_duration_us();
    info!(
        "[MUX] 완료: {} bytes, {} 프레임, 챕터 {}개, {}μs",
        bytes.len(),
        audio.frames.len(),
        if with_chapters { chapters.len() } else { 0 },
        duration_us
    );
    on_progress(1.0);

    Ok(ContainerOutput { bytes, duration_us, has_chapters: with_chapters })
}

fn write_ftyp(with_chapters: bool) -> Result<Vec<u8>> {
    let mut w = BoxWriter::new();
    w.start(b"ftyp");
    w.bytes(if with_chapters { b"M4B " } else { b"M4A " });
    w.u32(0); // minor version
    for brand in [b"M4A ", b"M4B ", b"isom", b"mp42"] {
        w.bytes(brand);
    }
    w.end()?;
    w.finish()
}

fn write_moov(
    audio: &EncodedAudio,
    chapters: &[ChapterBoundary],
    audio_layout: &TrackLayout,
    chapter_layout: Option<&TrackLayout>,
    base: u64,
    options: &MuxOptions,
) -> Result<Vec<u8>> {
    let dc = &audio.decoder_config;
    let timescale = dc.sample_rate;
    let mut w = BoxWriter::with_capacity(4096 + audio_layout.samples.len() * 8);

    w.start(b"moov");
    {
        let next_track_id = if chapter_layout.is_some() { 3 } else { 2 };
        write_mvhd(&mut w, timescale, audio_layout.duration, next_track_id)?;

        // 오디오 트랙
        w.start(b"trak");
        {
            write_tkhd(&mut w, AUDIO_TRACK_ID, TRACK_ENABLED | TRACK_IN_MOVIE, audio_layout.duration, 0x0100)?;
            if chapter_layout.is_some() {
                w.start(b"tref");
                w.start(b"chap");
                w.u32(CHAPTER_TRACK_ID);
                w.end()?;
                w.end()?;
            }
            w.start(b"mdia");
            write_mdhd(&mut w, timescale, audio_layout.duration)?;
            write_hdlr(&mut w, b"soun", "SoundHandler")?;
            w.start(b"minf");
            {
                w.start_full(b"smhd", 0, 0);
                w.u16(0); // balance
                w.u16(0);
                w.end()?;
                write_dinf(&mut w)?;
                w.start(b"stbl");
                write_audio_stsd(&mut w, dc, audio)?;
                write_sample_tables(&mut w, audio_layout, base)?;
                w.end()?;
            }
            w.end()?; // minf
            w.end()?; // mdia
        }
        w.end()?; // trak

        // 챕터 텍스트 트랙 (비활성, 화면 출력 없음)
        if let Some(layout) = chapter_layout {
            w.start(b"trak");
            {
                write_tkhd(&mut w, CHAPTER_TRACK_ID, TRACK_IN_MOVIE, layout.duration, 0)?;
                w.start(b"mdia");
                write_mdhd(&mut w, timescale, layout.duration)?;
                write_hdlr(&mut w, b"text", "ChapterHandler")?;
                w.start(b"minf");
                {
                    write_text_gmhd(&mut w)?;
                    write_dinf(&mut w)?;
                    w.start(b"stbl");
                    write_text_stsd(&mut w)?;
                    write_sample_tables(&mut w, layout, base)?;
                    w.end()?;
                }
                w.end()?; // minf
                w.end()?; // mdia
            }
            w.end()?; // trak

            if options.write_nero_chapters {
                write_chpl(&mut w, chapters, &layout.samples, timescale)?;
            }
        }
    }
    w.end()?; // moov

    debug!("[MUX] moov {} bytes (base offset {})", w.len(), base);
    w.finish()
}

fn write_mvhd(w: &mut BoxWriter, timescale: u32, duration: u64, next_track_id: u32) -> Result<()> {
    let long = duration > u32::MAX as u64;
    w.start_full(b"mvhd", if long { 1 } else { 0 }, 0);
    write_times(w, timescale, duration, long);
    w.u32(0x0001_0000); // rate 1.0
    w.u16(0x0100); // volume 1.0
    w.zeros(10);
    w.unity_matrix();
    w.zeros(24); // pre_defined
    w.u32(next_track_id);
    w.end()
}

fn write_tkhd(w: &mut BoxWriter, track_id: u32, flags: u32, duration: u64, volume: u16) -> Result<()> {
    let long = duration > u32::MAX as u64;
    w.start_full(b"tkhd", if long { 1 } else { 0 }, flags);
    if long {
        w.u64(0);
        w.u64(0);
    } else {
        w.u32(0);
        w.u32(0);
    }
    w.u32(track_id);
    w.u32(0); // reserved
    if long { w.u64(duration) } else { w.u32(duration as u32) }
    w.zeros(8);
    w.u16(0); // layer
    w.u16(0); // alternate_group
    w.u16(volume);
    w.u16(0);
    w.unity_matrix();
    w.u32(0); // width
    w.u32(0); // height
    w.end()
}

fn write_mdhd(w: &mut BoxWriter, timescale: u32, duration: u64) -> Result<()> {
    let long = duration > u32::MAX as u64;
    w.start_full(b"mdhd", if long { 1 } else { 0 }, 0);
    write_times(w, timescale, duration, long);
    w.u16(LANGUAGE_UND);
    w.u16(0);
    w.end()
}

/// creation/modification time + timescale + duration
fn write_times(w: &mut BoxWriter, timescale: u32, duration: u64, long: bool) {
    if long {
        w.u64(0);
        w.u64(0);
        w.u32(timescale);
        w.u64(duration);
    } else {
        w.u32(0);
        w.u32(0);
        w.u32(timescale);
        w.u32(duration as u32);
    }
}

fn write_hdlr(w: &mut BoxWriter, handler: &[u8; 4], name: &str) -> Result<()> {
    w.start_full(b"hdlr", 0, 0);
    w.u32(0); // pre_defined
    w.bytes(handler);
    w.zeros(12);
    w.bytes(name.as_bytes());
    w.u8(0);
    w.end()
}

fn write_dinf(w: &mut BoxWriter) -> Result<()> {
    w.start(b"dinf");
    w.start_full(b"dref", 0, 0);
    w.u32(1);
    w.start_full(b"url ", 0, 0x01); // self-contained
    w.end()?;
    w.end()?;
    w.end()
}

fn write_audio_stsd(w: &mut BoxWriter, dc: &DecoderConfig, audio: &EncodedAudio) -> Result<()> {
    w.start_full(b"stsd", 0, 0);
    w.u32(1);

    w.start(b"mp4a");
    w.zeros(6);
    w.u16(1); // data_reference_index
    w.zeros(8);
    w.u16(dc.channels);
    w.u16(16); // sample size
    w.u32(0);
    w.u32(dc.sample_rate << 16); // 16.16 고정소수

    w.start_full(b"esds", 0, 0);
    w.bytes(&build_es_descriptor(dc, audio));
    w.end()?;

    w.end()?; // mp4a
    w.end()
}

/// ES_Descriptor → DecoderConfigDescriptor → DecoderSpecificInfo(ASC) + SLConfig
fn build_es_descriptor(dc: &DecoderConfig, audio: &EncodedAudio) -> Vec<u8> {
    let max_frame = audio.frames.iter().map(|f| f.data.len()).max().unwrap_or(0) as u32;
    let total_bytes: u64 = audio.frames.iter().map(|f| f.data.len() as u64).sum();
    let duration_us = audio.total_duration_us().max(1) as u64;
    let avg_bitrate = (total_bytes * 8 * MICROS_PER_SECOND as u64 / duration_us) as u32;
    let max_bitrate = avg_bitrate.max(dc.bitrate);

    let mut dsi = vec![0x05];
    dsi.extend(descriptor_length(dc.description.len()));
    dsi.extend_from_slice(&dc.description);

    let mut dcd_body = vec![
        0x40, // objectTypeIndication: Audio ISO/IEC 14496-3
        0x15, // streamType audio(5) << 2 | 1
    ];
    dcd_body.extend_from_slice(&max_frame.to_be_bytes()[1..]); // bufferSizeDB (24bit)
    dcd_body.extend_from_slice(&max_bitrate.to_be_bytes());
    dcd_body.extend_from_slice(&avg_bitrate.to_be_bytes());
    dcd_body.extend(dsi);

    let mut dcd = vec![0x04];
    dcd.extend(descriptor_length(dcd_body.len()));
    dcd.extend(dcd_body);

    let sl = [0x06, 0x01, 0x02];

    let mut es_body = vec![0x00, AUDIO_TRACK_ID as u8, 0x00]; // ES_ID + flags
    es_body.extend(dcd);
    es_body.extend_from_slice(&sl);

    let mut es = vec![0x03];
    es.extend(descriptor_length(es_body.len()));
    es.extend(es_body);
    es
}

/// QuickTime 텍스트 샘플 엔트리 (챕터 트랙용)
fn write_text_stsd(w: &mut BoxWriter) -> Result<()> {
    w.start_full(b"stsd", 0, 0);
    w.u32(1);

    w.start(b"text");
    w.zeros(6);
    w.u16(1); // data_reference_index
    w.u32(0); // display flags
    w.i32(0); // text justification
    w.zeros(6); // background color
    w.zeros(8); // default text box
    w.zeros(8); // reserved
    w.u16(0); // font number
    w.u16(0); // font face
    w.u8(0);
    w.u16(0);
    w.zeros(6); // foreground color
    w.u8(0); // text name (빈 pascal string)
    w.end()?;

    w.end()
}

/// stts / stss / stsc / stsz / co64
fn write_sample_tables(w: &mut BoxWriter, layout: &TrackLayout, base: u64) -> Result<()> {
    let samples = &layout.samples;

    // stts - 같은 duration 연속 구간 run-length
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for s in samples {
        match runs.last_mut() {
            Some((count, delta)) if *delta == s.duration => *count += 1,
            _ => runs.push((1, s.duration)),
        }
    }
    w.start_full(b"stts", 0, 0);
    w.u32(runs.len() as u32);
    for (count, delta) in &runs {
        w.u32(*count);
        w.u32(*delta);
    }
    w.end()?;

    // stss - 전부 sync면 생략 (생략 = 모든 샘플 sync)
    if samples.iter().any(|s| !s.is_sync) {
        let sync: Vec<u32> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_sync)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        w.start_full(b"stss", 0, 0);
        w.u32(sync.len() as u32);
        for index in sync {
            w.u32(index);
        }
        w.end()?;
    }

    // stsc - chunk당 샘플 수가 바뀔 때만 항목 추가
    let mut stsc: Vec<(u32, u32)> = Vec::new();
    for (i, count) in layout.chunk_sizes.iter().enumerate() {
        if stsc.last().map_or(true, |(_, c)| c != count) {
            stsc.push((i as u32 + 1, *count));
        }
    }
    w.start_full(b"stsc", 0, 0);
    w.u32(stsc.len() as u32);
    for (first_chunk, per_chunk) in &stsc {
        w.u32(*first_chunk);
        w.u32(*per_chunk);
        w.u32(1); // sample_description_index
    }
    w.end()?;

    w.start_full(b"stsz", 0, 0);
    w.u32(0); // 가변 크기
    w.u32(samples.len() as u32);
    for s in samples {
        w.u32(s.size);
    }
    w.end()?;

    w.start_full(b"co64", 0, 0);
    w.u32(layout.chunk_offsets.len() as u32);
    for offset in &layout.chunk_offsets {
        w.u64(base + offset);
    }
    w.end()
}

/// QuickTime 텍스트 미디어 헤더 (gmhd: gmin + text)
fn write_text_gmhd(w: &mut BoxWriter) -> Result<()> {
    w.start(b"gmhd");
    w.start_full(b"gmin", 0, 0);
    w.u16(0x40); // graphics mode: dither copy
    for _ in 0..3 {
        w.u16(0x8000); // opcolor
    }
    w.u16(0); // balance
    w.u16(0);
    w.end()?;
    w.start(b"text");
    w.unity_matrix();
    w.end()?;
    w.end()
}

/// Nero 챕터 (udta/chpl) - 시작 시간 100ns 단위
/// 시작 위치는 챕터 텍스트 트랙 샘플과 동일 (첫 챕터 0)
fn write_chpl(
    w: &mut BoxWriter,
    chapters: &[ChapterBoundary],
    samples: &[SampleEntry],
    timescale: u32,
) -> Result<()> {
    const HUNDRED_NS_PER_SECOND: i64 = 10_000_000;

    w.start(b"udta");
    w.start_full(b"chpl", 1, 0);
    w.u32(0); // reserved
    let count = chapters.len().min(samples.len()).min(u8::MAX as usize);
    w.u8(count as u8);
    for (chapter, sample) in chapters.iter().zip(samples).take(count) {
        let start = scale_round(sample.decode_time as i64, HUNDRED_NS_PER_SECOND, timescale as i64);
        w.u64(start as u64);
        let title = chapter.title.as_bytes();
        let len = title.len().min(u8::MAX as usize);
        w.u8(len as u8);
        w.bytes(&title[..len]);
    }
    w.end()?;
    w.end()
}
