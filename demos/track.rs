use flowtrack::{BBox, FlowTracker, Frame, TargetStatus};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio,
};

pub struct VideoWriter {
    writer: Option<opencv::videoio::VideoWriter>,
    size: Option<(i32, i32)>,
    out_file: String,
}

impl VideoWriter {
    pub fn new<S: ToString>(out_file: S) -> Self {
        Self {
            writer: None,
            size: None,
            out_file: out_file.to_string(),
        }
    }

    pub fn release(&mut self) {
        if let Some(mut w) = self.writer.take() {
            w.release().unwrap();
        }
    }

    fn reinit(&mut self, size: (i32, i32)) {
        self.release();

        self.size = Some(size);
        self.writer = Some(
            opencv::videoio::VideoWriter::new(
                &self.out_file,
                opencv::videoio::VideoWriter::fourcc(b'X' as _, b'V' as _, b'I' as _, b'D' as _)
                    .unwrap(),
                24.0,
                core::Size::new(size.0, size.1),
                true,
            )
            .unwrap(),
        );
    }

    pub fn feed(&mut self, m: &mut Mat) {
        let size = (m.cols(), m.rows());

        if self.writer.is_none() || self.size != Some(size) {
            self.reinit(size);
        }

        self.writer.as_mut().unwrap().write(m).unwrap();
    }
}

fn draw_box(frame: &mut Mat, bbox: &BBox, active: bool) -> opencv::Result<()> {
    let rect = core::Rect::new(
        bbox.x as i32,
        bbox.y as i32,
        bbox.w as i32,
        bbox.h as i32,
    );
    let color = if active {
        core::Scalar::new(65.0, 255.0, 0.0, 0.0)
    } else {
        core::Scalar::new(200.0, 200.0, 0.0, 0.0)
    };

    imgproc::rectangle(frame, rect, color, 1, imgproc::LINE_8, 0)?;
    Ok(())
}

fn parse_seed(arg: &str) -> Option<BBox> {
    let parts: Vec<f32> = arg.split(',').filter_map(|p| p.trim().parse().ok()).collect();

    match parts.as_slice() {
        [x, y, w, h] => Some(BBox::new(*x, *y, *w, *h)),
        _ => None,
    }
}

fn main() -> Result<(), flowtrack::Error> {
    env_logger::init();

    let mut args = std::env::args();
    let _ = args.next().unwrap();
    let in_file_name = args.next().expect("expected video file name");
    let mode = args.next().unwrap_or_else(|| "radar".to_string());

    let mut cam = videoio::VideoCapture::from_file(&in_file_name, videoio::CAP_ANY)?;
    let opened = videoio::VideoCapture::is_opened(&cam)?;
    if !opened {
        panic!("Unable to open video file!");
    }

    let width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
    let height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
    let total = cam.get(videoio::CAP_PROP_FRAME_COUNT)? as i32;

    println!("video {}x{} {} frames", width, height, total);

    let mut tracker = FlowTracker::new();
    let seed = parse_seed(&mode);
    if seed.is_none() {
        tracker.set_radar_enabled(true);
        println!("radar armed");
    }

    let mut writer = VideoWriter::new("out.avi");
    let mut raw = Mat::default();
    let mut frame_idx = 0;

    loop {
        frame_idx += 1;
        print!("\rprogress {}/{}...", frame_idx, total);
        if !cam.read(&mut raw)? {
            break;
        }
        if raw.cols() == 0 || raw.rows() == 0 {
            break;
        }

        let frame = Frame::new(raw.clone())?;

        if frame_idx == 1 {
            if let Some(seed) = seed {
                match tracker.select(&frame, seed)? {
                    Some(id) => println!("\ntarget {} locked", id),
                    None => println!("\nseed box failed to lock"),
                }
            }
        }

        let snapshots = tracker.tick(&frame, 1.0)?;
        let active_id = tracker.roster().active_id();

        for snap in &snapshots {
            if snap.status != TargetStatus::Locked {
                continue;
            }
            if let Some(bbox) = &snap.bbox {
                draw_box(&mut raw, bbox, Some(snap.id) == active_id)?;
            }
        }

        let locked = snapshots
            .iter()
            .filter(|s| s.status == TargetStatus::Locked)
            .count();
        imgproc::put_text(
            &mut raw,
            &format!("{} TGT | {} CONTACTS", locked, tracker.radar().contacts().count()),
            core::Point::new(10, 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.9,
            core::Scalar::new(255.0, 255.0, 0.0, 255.0),
            1,
            imgproc::LINE_AA,
            false,
        )?;

        writer.feed(&mut raw);
    }
    println!("\nfinished");

    writer.release();

    Ok(())
}
