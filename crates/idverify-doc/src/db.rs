//! DB (Differentiable Binarization) text detection: input tensor and
//! probability-map post-processing.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use std::collections::VecDeque;

const DB_MAX_SIDE: u32 = 960;
const DB_ALIGN: u32 = 32;
const DB_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DB_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Thresholds applied to the probability map.
#[derive(Debug, Clone, Copy)]
pub struct DbParams {
    /// Pixel threshold for the binary map.
    pub binary_threshold: f32,
    /// Minimum mean probability inside a component.
    pub box_threshold: f32,
    /// Relative growth of a box; DB shrinks text kernels during training.
    pub unclip_ratio: f32,
    /// Minimum side length in map pixels.
    pub min_size: u32,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            binary_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            min_size: 3,
        }
    }
}

/// Axis-aligned text box in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl TextBox {
    fn center_y(&self) -> f32 {
        self.y as f32 + self.height as f32 / 2.0
    }
}

/// Detector input for `image` and the size of the probability map it yields.
pub struct DbInput {
    pub tensor: Array4<f32>,
    pub map_width: u32,
    pub map_height: u32,
}

/// Resize so the longer side is at most 960 and both sides are multiples of 32,
/// then normalize with ImageNet statistics into a BGR NCHW tensor.
pub fn preprocess(image: &RgbImage) -> DbInput {
    let (w, h) = image.dimensions();
    let ratio = if w.max(h) > DB_MAX_SIDE {
        DB_MAX_SIDE as f32 / w.max(h) as f32
    } else {
        1.0
    };
    let align = |v: u32| -> u32 {
        let scaled = (v as f32 * ratio).round() as u32;
        (((scaled + DB_ALIGN / 2) / DB_ALIGN) * DB_ALIGN).max(DB_ALIGN)
    };
    let map_width = align(w);
    let map_height = align(h);

    let resized = imageops::resize(image, map_width, map_height, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, map_height as usize, map_width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        // PaddleOCR models are trained on BGR input.
        for (c, src) in [2usize, 1, 0].into_iter().enumerate() {
            let v = pixel[src] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (v - DB_MEAN[c]) / DB_STD[c];
        }
    }

    DbInput {
        tensor,
        map_width,
        map_height,
    }
}

/// Turn a `map_height` × `map_width` probability map into text boxes in source pixels.
pub fn boxes_from_map(
    prob: &[f32],
    map_width: u32,
    map_height: u32,
    source_width: u32,
    source_height: u32,
    params: &DbParams,
) -> Vec<TextBox> {
    let (mw, mh) = (map_width as usize, map_height as usize);
    if prob.len() < mw * mh {
        return Vec::new();
    }
    let scale_x = source_width as f32 / map_width as f32;
    let scale_y = source_height as f32 / map_height as f32;

    let mut visited = vec![false; mw * mh];
    let mut boxes = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mw * mh {
        if visited[start] || prob[start] <= params.binary_threshold {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (mw, mh, 0usize, 0usize);
        let mut sum = 0.0f32;
        let mut count = 0usize;

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % mw, idx / mw);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            sum += prob[idx];
            count += 1;

            let neighbours = [
                (x > 0).then(|| idx - 1),
                (x + 1 < mw).then(|| idx + 1),
                (y > 0).then(|| idx - mw),
                (y + 1 < mh).then(|| idx + mw),
            ];
            for n in neighbours.into_iter().flatten() {
                if !visited[n] && prob[n] > params.binary_threshold {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        let box_w = (max_x - min_x + 1) as f32;
        let box_h = (max_y - min_y + 1) as f32;
        let score = sum / count as f32;
        if score < params.box_threshold || box_w.min(box_h) < params.min_size as f32 {
            continue;
        }

        let distance = box_w * box_h * params.unclip_ratio / (2.0 * (box_w + box_h));
        let x1 = ((min_x as f32 - distance) * scale_x).max(0.0);
        let y1 = ((min_y as f32 - distance) * scale_y).max(0.0);
        let x2 = ((max_x as f32 + 1.0 + distance) * scale_x).min(source_width as f32);
        let y2 = ((max_y as f32 + 1.0 + distance) * scale_y).min(source_height as f32);
        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            continue;
        }

        boxes.push(TextBox {
            x: x1 as u32,
            y: y1 as u32,
            width: ((x2 - x1).round() as u32).max(1),
            height: ((y2 - y1).round() as u32).max(1),
            score,
        });
    }

    reading_order(boxes)
}

/// Sort boxes top-to-bottom into rows, then left-to-right within each row.
///
/// Boxes whose vertical centers are within half the median box height of a
/// row's first box belong to that row.
pub fn reading_order(mut boxes: Vec<TextBox>) -> Vec<TextBox> {
    if boxes.len() < 2 {
        return boxes;
    }
    let mut heights: Vec<u32> = boxes.iter().map(|b| b.height).collect();
    heights.sort_unstable();
    let tolerance = heights[heights.len() / 2] as f32 / 2.0;

    boxes.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

    let mut rows: Vec<Vec<TextBox>> = Vec::new();
    for b in boxes {
        match rows.last_mut() {
            Some(row) if (b.center_y() - row[0].center_y()).abs() <= tolerance => row.push(b),
            _ => rows.push(vec![b]),
        }
    }

    rows.into_iter()
        .flat_map(|mut row| {
            row.sort_by_key(|b| b.x);
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(w: usize, h: usize, rects: &[(usize, usize, usize, usize, f32)]) -> Vec<f32> {
        let mut map = vec![0.0f32; w * h];
        for &(x, y, rw, rh, p) in rects {
            for yy in y..y + rh {
                for xx in x..x + rw {
                    map[yy * w + xx] = p;
                }
            }
        }
        map
    }

    fn tb(x: u32, y: u32, w: u32, h: u32) -> TextBox {
        TextBox { x, y, width: w, height: h, score: 1.0 }
    }

    #[test]
    fn preprocess_aligns_to_32() {
        let input = preprocess(&RgbImage::new(1000, 500));
        assert_eq!(input.map_width % 32, 0);
        assert_eq!(input.map_height % 32, 0);
        assert!(input.map_width <= 960);
        assert_eq!(input.tensor.shape(), &[1, 3, input.map_height as usize, input.map_width as usize]);
    }

    #[test]
    fn preprocess_tiny_image_gets_minimum_size() {
        let input = preprocess(&RgbImage::new(5, 5));
        assert_eq!((input.map_width, input.map_height), (32, 32));
    }

    #[test]
    fn finds_two_separate_lines() {
        let map = map_with(64, 32, &[(4, 4, 40, 6, 0.9), (4, 20, 20, 6, 0.8)]);
        let boxes = boxes_from_map(&map, 64, 32, 64, 32, &DbParams::default());
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].y < boxes[1].y);
        // unclip grows the kernel
        assert!(boxes[0].width > 40);
        assert!(boxes[0].x < 4);
    }

    #[test]
    fn low_score_components_dropped() {
        let map = map_with(64, 32, &[(4, 4, 40, 6, 0.45)]);
        assert!(boxes_from_map(&map, 64, 32, 64, 32, &DbParams::default()).is_empty());
    }

    #[test]
    fn tiny_components_dropped() {
        let map = map_with(64, 32, &[(4, 4, 30, 2, 0.95)]);
        assert!(boxes_from_map(&map, 64, 32, 64, 32, &DbParams::default()).is_empty());
    }

    #[test]
    fn boxes_scale_to_source() {
        let map = map_with(32, 32, &[(8, 8, 16, 8, 0.9)]);
        let params = DbParams { unclip_ratio: 0.0, ..DbParams::default() };
        let boxes = boxes_from_map(&map, 32, 32, 64, 64, &params);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!((b.x, b.y, b.width, b.height), (16, 16, 32, 16));
        assert!((b.score - 0.9).abs() < 1e-4);
    }

    #[test]
    fn empty_map_has_no_boxes() {
        assert!(boxes_from_map(&vec![0.0; 32 * 32], 32, 32, 32, 32, &DbParams::default()).is_empty());
    }

    #[test]
    fn reading_order_groups_rows() {
        let boxes = vec![tb(100, 52, 40, 20), tb(10, 10, 50, 20), tb(5, 50, 60, 20), tb(80, 12, 30, 20)];
        let ordered = reading_order(boxes);
        let xs: Vec<u32> = ordered.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![10, 80, 5, 100]);
    }
}
