//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and converted to RGB24. End of file drains
//! the decoder and then yields `None`.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use crate::frame::RgbFrame;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_rate: f64,
    total_frames: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();

        let avg_rate = input_stream.avg_frame_rate();
        let frame_rate = if avg_rate.denominator() != 0 {
            f64::from(avg_rate.numerator()) / f64::from(avg_rate.denominator())
        } else {
            0.0
        };
        let total_frames = input_stream.frames().max(0) as u64;

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("FileSource: opened {} (ffmpeg)", config.path);

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            frame_rate,
            total_frames,
            eof_sent: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<RgbFrame>> {
        loop {
            if let Some(frame) = self.receive_decoded()? {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut sent_packet = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent_packet = true;
                break;
            }
            if !sent_packet {
                // Demuxer exhausted; flush remaining frames out of the decoder.
                self.decoder
                    .send_eof()
                    .context("flush ffmpeg decoder at end of file")?;
                self.eof_sent = true;
            }
        }
    }

    fn receive_decoded(&mut self) -> Result<Option<RgbFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Ok(Some(RgbFrame::new(pixels, width, height)))
    }

    pub(crate) fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
