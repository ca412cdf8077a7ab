//! FFmpeg-backed container decoding and encoding.
//!
//! Decoded frames are converted to packed RGB24 in-memory. The encoder writes
//! MPEG-4 part 2 video into a staging file next to the destination, which is
//! moved into place on `finish()`.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::util::format::pixel::Pixel;
use ffmpeg::Rational;
use tempfile::NamedTempFile;

use crate::error::PipelineError;
use crate::frame::{Frame, VideoProperties};

use super::{staging_parent, FrameGate, FrameSink, FrameSource};

pub(crate) struct FfmpegSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    properties: VideoProperties,
    frame_count: u64,
    eof_sent: bool,
}

impl FfmpegSource {
    pub(crate) fn open(path: &str, fallback_fps: u32) -> Result<Self, PipelineError> {
        let unavailable = |reason: String| PipelineError::source_unavailable(path, reason);

        ffmpeg::init().map_err(|e| unavailable(format!("initialize ffmpeg: {e}")))?;
        let input = ffmpeg::format::input(&path)
            .map_err(|e| unavailable(format!("open input: {e}")))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unavailable("file has no video track".to_string()))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| unavailable(format!("load video decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| unavailable(format!("open video decoder: {e}")))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(format!("create scaler: {e}")))?;

        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            (rate.numerator() / rate.denominator()).max(1) as u32
        } else {
            log::warn!(
                "FfmpegSource: {} reports no frame rate, using {} fps",
                path,
                fallback_fps
            );
            fallback_fps
        };
        let properties = VideoProperties {
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };
        log::info!(
            "FfmpegSource: opened {} ({}x{} at {} fps)",
            path,
            properties.width,
            properties.height,
            properties.fps
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            properties,
            frame_count: 0,
            eof_sent: false,
        })
    }

    fn decode_error(&self, reason: impl std::fmt::Display) -> PipelineError {
        PipelineError::source_unavailable(
            &self.path,
            format!("decode after frame {}: {}", self.frame_count, reason),
        )
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame, PipelineError> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| self.decode_error(format!("scale frame to RGB: {e}")))?;
        let pixels = frame_to_pixels(&rgb_frame).ok_or_else(|| {
            self.decode_error("ffmpeg frame row is out of bounds")
        })?;
        self.frame_count += 1;
        Frame::from_rgb(
            self.frame_count,
            rgb_frame.width(),
            rgb_frame.height(),
            pixels,
        )
        .ok_or_else(|| self.decode_error("decoded buffer does not match frame size"))
    }
}

impl FrameSource for FfmpegSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| self.decode_error(format!("send packet: {e}")))?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| self.decode_error(format!("flush decoder: {e}")))?;
                    self.eof_sent = true;
                }
                Err(e) => return Err(self.decode_error(format!("read packet: {e}"))),
            }
        }
    }

    fn frames_read(&self) -> u64 {
        self.frame_count
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Option<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return data.get(..row_bytes * height).map(|d| d.to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes)?);
    }
    Some(pixels)
}

pub(crate) struct FfmpegSink {
    destination: PathBuf,
    staging: NamedTempFile,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    gate: FrameGate,
}

impl FfmpegSink {
    pub(crate) fn create(
        destination: &Path,
        properties: VideoProperties,
    ) -> Result<Self, PipelineError> {
        let failure = |reason: String| PipelineError::sink_write(destination, reason);
        ffmpeg::init().map_err(|e| failure(format!("initialize ffmpeg: {e}")))?;

        let parent = staging_parent(destination);
        std::fs::create_dir_all(&parent).map_err(|e| failure(e.to_string()))?;
        let suffix = destination
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(".video-staging-")
            .suffix(&suffix)
            .tempfile_in(&parent)
            .map_err(|e| failure(format!("create staging file: {e}")))?;

        let mut output = ffmpeg::format::output(&staging.path())
            .map_err(|e| failure(format!("open output container: {e}")))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| failure("MPEG-4 encoder not available".to_string()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let fps = properties.fps.max(1) as i32;
        let encoder_time_base = Rational::new(1, fps);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| failure(format!("create encoder: {e}")))?;
        encoder.set_width(properties.width);
        encoder.set_height(properties.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(fps, 1)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec)
            .map_err(|e| failure(format!("open encoder: {e}")))?;

        let stream_index = {
            let mut stream = output
                .add_stream(codec)
                .map_err(|e| failure(format!("add video stream: {e}")))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };
        output
            .write_header()
            .map_err(|e| failure(format!("write container header: {e}")))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| failure("video stream missing after header".to_string()))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            Pixel::RGB24,
            properties.width,
            properties.height,
            Pixel::YUV420P,
            properties.width,
            properties.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| failure(format!("create scaler: {e}")))?;

        Ok(Self {
            destination: destination.to_path_buf(),
            staging,
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            gate: FrameGate::new(properties),
        })
    }

    fn failure(&self, reason: impl std::fmt::Display) -> PipelineError {
        PipelineError::sink_write(&self.destination, reason)
    }

    fn drain_packets(&mut self) -> Result<(), PipelineError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| self.failure(format!("write packet: {e}")))?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        self.gate.admit(frame, &self.destination)?;

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, frame.width(), frame.height());
        let row_bytes = frame.width() as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, src) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            plane[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .map_err(|e| self.failure(format!("convert frame to YUV: {e}")))?;
        yuv.set_pts(Some(self.gate.written as i64 - 1));

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| self.failure(format!("encode frame {}: {e}", frame.index())))?;
        self.drain_packets()
    }

    fn frames_written(&self) -> u64 {
        self.gate.written
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, PipelineError> {
        self.encoder
            .send_eof()
            .map_err(|e| self.failure(format!("flush encoder: {e}")))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| self.failure(format!("write container trailer: {e}")))?;

        let Self {
            destination,
            staging,
            output,
            gate,
            ..
        } = *self;
        drop(output);
        staging
            .persist(&destination)
            .map_err(|e| PipelineError::sink_write(&destination, e.error))?;
        log::info!(
            "FfmpegSink: wrote {} frames to {}",
            gate.written,
            destination.display()
        );
        Ok(destination)
    }
}
