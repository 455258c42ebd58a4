/// Borrowed 8-bit grayscale image, row-major.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned counterpart of [`GrayImageView`].
#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f64 && y <= (self.height - 1) as f64
    }
}

/// Clamp-to-edge pixel fetch.
#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i64, y: i64) -> f64 {
    let x = x.clamp(0, src.width as i64 - 1) as usize;
    let y = y.clamp(0, src.height as i64 - 1) as usize;
    src.data[y * src.width + x] as f64
}

/// Bilinear interpolation with edge replication.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get_gray(src, x0, y0);
    let p10 = get_gray(src, x0 + 1, y0);
    let p01 = get_gray(src, x0, y0 + 1);
    let p11 = get_gray(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}
