use opencv::core::Scalar;
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// An `(r, g, b)` color triple as written in configuration.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const DEFAULT: Rgb = Rgb(255, 255, 255);

    /// OpenCV draws in BGR order.
    pub fn to_scalar(self) -> Scalar {
        Scalar::new(self.2 as f64, self.1 as f64, self.0 as f64, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorLabel {
    pub label: String,
    pub color: Rgb,
}

pub fn load_color_labels(filepath: &Path) -> io::Result<Vec<ColorLabel>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut color_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();

        if parts.len() == 4 {
            let label = parts[0].trim().to_string();
            let red = parse_channel(parts[1], "red")?;
            let green = parse_channel(parts[2], "green")?;
            let blue = parse_channel(parts[3], "blue")?;

            color_labels.push(ColorLabel {
                label,
                color: Rgb(red, green, blue),
            });
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }
    }

    Ok(color_labels)
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u8> {
    value.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value.trim()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_color_labels() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "smoke, 50, 200, 50").unwrap();
        writeln!(file, "fire,255,50,0").unwrap();
        writeln!(file).unwrap();

        let labels = load_color_labels(file.path()).unwrap();

        assert_eq!(
            labels,
            vec![
                ColorLabel {
                    label: "smoke".to_string(),
                    color: Rgb(50, 200, 50),
                },
                ColorLabel {
                    label: "fire".to_string(),
                    color: Rgb(255, 50, 0),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_line_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fire,255,50").unwrap();

        let err = load_color_labels(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_channel_out_of_range_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fire,256,50,0").unwrap();

        assert!(load_color_labels(file.path()).is_err());
    }

    #[test]
    fn test_to_scalar_is_bgr() {
        let scalar = Rgb(255, 50, 0).to_scalar();
        assert_eq!(scalar[0], 0.0);
        assert_eq!(scalar[1], 50.0);
        assert_eq!(scalar[2], 255.0);
    }
}
