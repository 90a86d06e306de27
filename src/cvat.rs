//! CVAT for images 1.1 XML export structures

use serde::Deserialize;

use crate::geometry::{FrameSize, GeometryError};
use crate::mask::{decode_runs, MaskError, OccupancyMask, RunOrder};

/// Root `<annotations>` element
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CvatAnnotations {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(rename = "image", default)]
    pub images: Vec<CvatImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub task: Option<Task>,
    #[serde(default)]
    pub project: Option<Project>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Labels {
    #[serde(rename = "label", default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// One `<image>` element, i.e. one frame
#[derive(Debug, Clone, Deserialize)]
pub struct CvatImage {
    #[serde(rename = "@id")]
    pub id: u32,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@width")]
    pub width: u32,
    #[serde(rename = "@height")]
    pub height: u32,
    #[serde(rename = "polygon", default)]
    pub polygons: Vec<CvatPolygon>,
    #[serde(rename = "box", default)]
    pub boxes: Vec<CvatBox>,
    #[serde(rename = "mask", default)]
    pub masks: Vec<CvatMask>,
}

impl CvatImage {
    pub fn frame_size(&self) -> Result<FrameSize, GeometryError> {
        FrameSize::new(self.width, self.height)
    }

    pub fn shape_count(&self) -> usize {
        self.polygons.len() + self.boxes.len() + self.masks.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CvatPolygon {
    #[serde(rename = "@label")]
    pub label: String,
    #[serde(rename = "@points")]
    pub points: String,
}

impl CvatPolygon {
    pub fn points(&self) -> Result<Vec<(f64, f64)>, GeometryError> {
        parse_points(&self.points)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CvatBox {
    #[serde(rename = "@label")]
    pub label: String,
    #[serde(rename = "@xtl")]
    pub xtl: f64,
    #[serde(rename = "@ytl")]
    pub ytl: f64,
    #[serde(rename = "@xbr")]
    pub xbr: f64,
    #[serde(rename = "@ybr")]
    pub ybr: f64,
}

impl CvatBox {
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.xtl, self.ytl),
            (self.xbr, self.ytl),
            (self.xbr, self.ybr),
            (self.xtl, self.ybr),
        ]
    }
}

/// Bitmap mask; `rle` holds row-major runs over the `width x height` region at
/// (`left`, `top`)
#[derive(Debug, Clone, Deserialize)]
pub struct CvatMask {
    #[serde(rename = "@label")]
    pub label: String,
    #[serde(rename = "@rle")]
    pub rle: String,
    #[serde(rename = "@left")]
    pub left: u32,
    #[serde(rename = "@top")]
    pub top: u32,
    #[serde(rename = "@width")]
    pub width: u32,
    #[serde(rename = "@height")]
    pub height: u32,
}

impl CvatMask {
    /// Decode the mask into a grid covering the whole frame
    pub fn decode(&self, frame: FrameSize) -> Result<OccupancyMask, MaskError> {
        let counts = self
            .rle
            .split(',')
            .map(str::trim)
            .filter(|count| !count.is_empty())
            .map(|count| {
                count.parse::<u32>().map_err(|e| {
                    MaskError::InvalidCompressedCounts(format!("bad run length {:?}: {}", count, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let local = decode_runs(
            &counts,
            self.width as usize,
            self.height as usize,
            RunOrder::RowMajor,
        )?;
        let mut full = OccupancyMask::new(frame.width() as usize, frame.height() as usize);
        full.paint(&local, self.left as usize, self.top as usize);
        Ok(full)
    }
}

impl CvatAnnotations {
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Label names in declaration order; the task's labels win over the project's
    pub fn label_names(&self) -> Vec<String> {
        let task_labels = self.meta.task.as_ref().map(|task| &task.labels.labels);
        let project_labels = self.meta.project.as_ref().map(|p| &p.labels.labels);
        task_labels
            .filter(|labels| !labels.is_empty())
            .or(project_labels)
            .map(|labels| labels.iter().map(|label| label.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of frames in the task, or one past the highest image id when the
    /// export carries no size
    pub fn frame_count(&self) -> usize {
        self.meta
            .task
            .as_ref()
            .and_then(|task| task.size)
            .map(|size| size as usize)
            .unwrap_or_else(|| {
                self.images
                    .iter()
                    .map(|image| image.id as usize + 1)
                    .max()
                    .unwrap_or(0)
            })
    }
}

/// Parse CVAT's `x1,y1;x2,y2;...` point list
pub fn parse_points(points: &str) -> Result<Vec<(f64, f64)>, GeometryError> {
    points
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (x, y) = pair.split_once(',').ok_or_else(|| {
                GeometryError::MalformedShape(format!("point {:?} is not an x,y pair", pair))
            })?;
            let parse = |value: &str| {
                value.trim().parse::<f64>().map_err(|e| {
                    GeometryError::MalformedShape(format!("bad coordinate {:?}: {}", value, e))
                })
            };
            Ok((parse(x)?, parse(y)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<annotations>
  <version>1.1</version>
  <meta>
    <task>
      <id>12</id>
      <name>fish</name>
      <size>3</size>
      <labels>
        <label><name>salmon</name><color>#fa3253</color><attributes></attributes></label>
        <label><name>trout</name><color>#33ddff</color><attributes></attributes></label>
      </labels>
    </task>
    <dumped>2024-05-01 10:00:00.000000+00:00</dumped>
  </meta>
  <image id="0" name="frame_000000.PNG" width="100" height="50">
    <polygon label="trout" source="manual" occluded="0" points="10.0,5.0;30.0,5.0;30.0,25.0" z_order="0"></polygon>
    <box label="salmon" source="manual" occluded="0" xtl="40.0" ytl="10.0" xbr="60.0" ybr="20.0" z_order="0"></box>
    <polygon label="salmon" source="manual" occluded="0" points="1,1;2,1;2,2" z_order="0"></polygon>
  </image>
  <image id="2" name="frame_000002.PNG" width="100" height="50">
    <mask label="trout" source="manual" occluded="0" rle="0, 2, 2, 2" left="5" top="6" width="2" height="3" z_order="0"></mask>
  </image>
</annotations>"#;

    #[test]
    fn test_parse_sample() {
        let cvat = CvatAnnotations::from_xml(SAMPLE).unwrap();
        assert_eq!(cvat.version.as_deref(), Some("1.1"));
        assert_eq!(cvat.label_names(), vec!["salmon", "trout"]);
        assert_eq!(cvat.frame_count(), 3);
        assert_eq!(cvat.images.len(), 2);
        assert_eq!(cvat.images[0].polygons.len(), 2);
        assert_eq!(cvat.images[0].boxes.len(), 1);
        assert_eq!(cvat.images[1].masks.len(), 1);
        assert_eq!(cvat.images[0].shape_count(), 3);
    }

    #[test]
    fn test_frame_count_without_task_size() {
        let cvat = CvatAnnotations::from_xml(
            r#"<annotations><image id="4" name="x.png" width="2" height="2"/></annotations>"#,
        )
        .unwrap();
        assert_eq!(cvat.frame_count(), 5);
        assert!(cvat.label_names().is_empty());
    }

    #[test]
    fn test_parse_points() {
        assert_eq!(
            parse_points("1.5,2;3,4.25").unwrap(),
            vec![(1.5, 2.0), (3.0, 4.25)]
        );
        assert!(parse_points("1.5;3,4").is_err());
        assert!(parse_points("a,b").is_err());
    }

    #[test]
    fn test_mask_decode_places_region() {
        let cvat = CvatAnnotations::from_xml(SAMPLE).unwrap();
        let image = &cvat.images[1];
        let mask = image.masks[0].decode(image.frame_size().unwrap()).unwrap();
        assert_eq!(mask.width(), 100);
        assert_eq!(mask.count(), 4);
        // local row-major runs: row 0 full, row 1 empty, row 2 full
        assert!(mask.get(5, 6));
        assert!(mask.get(6, 6));
        assert!(!mask.get(5, 7));
        assert!(mask.get(6, 8));
    }
}
