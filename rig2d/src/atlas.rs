use crate::Error;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Parsed texture atlas descriptor. Pages reference image files by name;
/// regions carry the pixel rectangle and UV extent a renderer needs to crop
/// the sub-image out of its page (rotated regions are stored rotated 90
/// degrees clockwise in the page).
#[derive(Clone, Debug)]
pub struct Atlas {
    pub pages: Vec<AtlasPage>,
    pub regions: HashMap<String, TextureRegion>,
}

#[derive(Clone, Debug)]
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pma: bool,
}

#[derive(Clone, Debug)]
pub struct TextureRegion {
    pub name: String,
    pub page: usize,
    pub x: u32,
    pub y: u32,
    /// Logical (unrotated) size.
    pub width: u32,
    pub height: u32,
    pub rotate: bool,
    pub u: f32,
    pub v: f32,
    pub u2: f32,
    pub v2: f32,
}

impl TextureRegion {
    /// Crop rectangle `(x, y, w, h)` within the page image. Width and height
    /// are swapped for rotated regions because that is how they are packed.
    pub fn pixel_rect(&self) -> (u32, u32, u32, u32) {
        if self.rotate {
            (self.x, self.y, self.height, self.width)
        } else {
            (self.x, self.y, self.width, self.height)
        }
    }
}

impl Atlas {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut parser = AtlasParser::default();
        for line in input.lines() {
            parser.line(line)?;
        }
        parser.finish()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input)
    }

    pub fn find_region(&self, name: &str) -> Option<&TextureRegion> {
        self.regions.get(name)
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }
}

impl FromStr for Atlas {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Atlas::parse(s)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum ParserState {
    /// Before a page header; blank lines are skipped.
    #[default]
    ExpectPage,
    /// After a page name; `key: value` lines are page attributes, the first
    /// plain line starts a region. Blank lines are tolerated so headers may
    /// be separated from their regions.
    ExpectRegionOrBlank,
    /// Inside a region; `key: value` lines are region attributes, a plain
    /// line starts the next region, a blank line ends the region but keeps
    /// the page.
    RegionAttributes,
    /// After a blank that ended a region; a plain line is another region of
    /// the same page, a second blank ends the page.
    ExpectRegionOrPageBreak,
}

#[derive(Debug, Default)]
struct AtlasParser {
    state: ParserState,
    pages: Vec<AtlasPage>,
    regions: HashMap<String, TextureRegion>,
    current_region: Option<TextureRegion>,
}

impl AtlasParser {
    fn line(&mut self, raw_line: &str) -> Result<(), Error> {
        let line = raw_line.trim();

        match self.state {
            ParserState::ExpectPage => {
                if line.is_empty() {
                    return Ok(());
                }
                self.pages.push(AtlasPage {
                    name: line.to_string(),
                    width: 0,
                    height: 0,
                    pma: false,
                });
                self.state = ParserState::ExpectRegionOrBlank;
            }
            ParserState::ExpectRegionOrBlank => {
                if line.is_empty() {
                    return Ok(());
                }
                if let Some((key, value)) = line.split_once(':') {
                    self.page_attribute(key.trim(), value.trim())?;
                } else {
                    self.begin_region(line);
                }
            }
            ParserState::RegionAttributes => {
                if line.is_empty() {
                    self.finalize_region()?;
                    self.state = ParserState::ExpectRegionOrPageBreak;
                    return Ok(());
                }
                if let Some((key, value)) = line.split_once(':') {
                    self.region_attribute(key.trim(), value.trim())?;
                } else {
                    self.finalize_region()?;
                    self.begin_region(line);
                }
            }
            ParserState::ExpectRegionOrPageBreak => {
                if line.is_empty() {
                    self.state = ParserState::ExpectPage;
                    return Ok(());
                }
                if let Some((key, value)) = line.split_once(':') {
                    self.page_attribute(key.trim(), value.trim())?;
                } else {
                    self.begin_region(line);
                }
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Result<Atlas, Error> {
        self.finalize_region()?;
        if self.pages.is_empty() {
            return Err(Error::AtlasParse {
                message: "empty atlas".to_string(),
            });
        }
        Ok(Atlas {
            pages: self.pages,
            regions: self.regions,
        })
    }

    fn begin_region(&mut self, name: &str) {
        self.current_region = Some(TextureRegion {
            name: name.to_string(),
            page: self.pages.len() - 1,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            rotate: false,
            u: 0.0,
            v: 0.0,
            u2: 1.0,
            v2: 1.0,
        });
        self.state = ParserState::RegionAttributes;
    }

    fn page_attribute(&mut self, key: &str, value: &str) -> Result<(), Error> {
        // A page is always pushed before entering ExpectRegionOrBlank.
        let Some(page) = self.pages.last_mut() else {
            return Ok(());
        };
        match key {
            "size" => {
                let (w, h) = parse_pair_u32(value).ok_or_else(|| Error::AtlasParse {
                    message: format!("invalid page size: {value}"),
                })?;
                page.width = w;
                page.height = h;
            }
            "pma" => {
                page.pma = matches!(value, "true");
            }
            _ => {}
        }
        Ok(())
    }

    fn region_attribute(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let Some(region) = self.current_region.as_mut() else {
            return Ok(());
        };
        match key {
            "rotate" => {
                region.rotate = matches!(value, "true");
            }
            "xy" => {
                let (x, y) = parse_pair_u32(value).ok_or_else(|| Error::AtlasParse {
                    message: format!("invalid region xy: {value}"),
                })?;
                region.x = x;
                region.y = y;
            }
            "size" => {
                let (w, h) = parse_pair_u32(value).ok_or_else(|| Error::AtlasParse {
                    message: format!("invalid region size: {value}"),
                })?;
                region.width = w;
                region.height = h;
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize_region(&mut self) -> Result<(), Error> {
        let Some(mut region) = self.current_region.take() else {
            return Ok(());
        };

        let page = self.pages.get(region.page);
        let (pw, ph) = match page {
            Some(page) if page.width > 0 && page.height > 0 => (page.width, page.height),
            _ => {
                return Err(Error::AtlasParse {
                    message: format!("page for region '{}' has no size", region.name),
                });
            }
        };

        let pw = pw as f32;
        let ph = ph as f32;
        region.u = region.x as f32 / pw;
        region.v = region.y as f32 / ph;
        if region.rotate {
            region.u2 = (region.x + region.height) as f32 / pw;
            region.v2 = (region.y + region.width) as f32 / ph;
        } else {
            region.u2 = (region.x + region.width) as f32 / pw;
            region.v2 = (region.y + region.height) as f32 / ph;
        }

        self.regions.insert(region.name.clone(), region);
        Ok(())
    }
}

fn parse_pair_u32(value: &str) -> Option<(u32, u32)> {
    let (a, b) = value.split_once(',')?;
    let a = a.trim().parse().ok()?;
    let b = b.trim().parse().ok()?;
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f32, expected: f32) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= 1.0e-6,
            "expected {expected}, got {actual} (diff {diff})"
        );
    }

    #[test]
    fn parse_minimal_atlas_one_page_one_region() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 100,100
pma: true

head
  rotate: false
  xy: 10, 20
  size: 30, 40
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 1);
        assert_eq!(atlas.pages[0].name, "page.png");
        assert_eq!(atlas.pages[0].width, 100);
        assert_eq!(atlas.pages[0].height, 100);
        assert!(atlas.pages[0].pma);

        let region = atlas.find_region("head").unwrap();
        assert_eq!(region.page, 0);
        assert!(!region.rotate);
        assert_eq!(region.pixel_rect(), (10, 20, 30, 40));
        assert_approx(region.u, 0.1);
        assert_approx(region.v, 0.2);
        assert_approx(region.u2, 0.4);
        assert_approx(region.v2, 0.6);
    }

    #[test]
    fn parse_rotated_region_swaps_uv_extent_and_pixel_rect() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 100,100

arm
  rotate: true
  xy: 0, 0
  size: 10, 20
"#,
        )
        .unwrap();

        let region = atlas.find_region("arm").unwrap();
        assert!(region.rotate);
        assert_eq!(region.width, 10);
        assert_eq!(region.height, 20);
        // The packed rect uses the swapped dimensions.
        assert_eq!(region.pixel_rect(), (0, 0, 20, 10));
        assert_approx(region.u2, 0.2);
        assert_approx(region.v2, 0.1);
    }

    #[test]
    fn parse_atlas_multiple_pages_assigns_region_pages() {
        let atlas = Atlas::parse(
            r#"
page0.png
size: 32,32

r0
  xy: 0, 0
  size: 1, 1


page1.png
size: 64,64

r1
  xy: 2, 3
  size: 4, 5
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 2);
        assert_eq!(atlas.find_region("r0").unwrap().page, 0);
        let r1 = atlas.find_region("r1").unwrap();
        assert_eq!(r1.page, 1);
        assert_eq!(r1.pixel_rect(), (2, 3, 4, 5));
    }

    #[test]
    fn blank_line_between_regions_keeps_the_page() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 16,16

a
  xy: 0, 0
  size: 1, 1

b
  xy: 2, 2
  size: 3, 3
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 1);
        let b = atlas.find_region("b").unwrap();
        assert_eq!(b.page, 0);
        assert_eq!(b.pixel_rect(), (2, 2, 3, 3));
    }

    #[test]
    fn parse_atlas_back_to_back_regions_without_blank_lines() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 16,16

a
  xy: 0, 0
  size: 1, 1
b
  xy: 2, 2
  size: 3, 3
"#,
        )
        .unwrap();

        assert_eq!(atlas.regions.len(), 2);
        assert_eq!(atlas.find_region("b").unwrap().x, 2);
    }

    #[test]
    fn parse_atlas_ignores_unknown_attributes() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 16,16
filter: Linear, Linear
repeat: none

a
  xy: 1, 1
  size: 2, 2
  orig: 4, 4
  offset: 1, 1
  index: -1
"#,
        )
        .unwrap();

        let region = atlas.find_region("a").unwrap();
        assert_eq!(region.pixel_rect(), (1, 1, 2, 2));
    }

    #[test]
    fn find_region_miss_returns_none() {
        let atlas = Atlas::parse("page.png\nsize: 8,8\n\nhead\n  xy: 0,0\n  size: 1,1\n").unwrap();
        assert!(atlas.find_region("missing").is_none());
    }

    #[test]
    fn empty_atlas_is_an_error() {
        assert!(matches!(
            Atlas::parse("\n\n"),
            Err(Error::AtlasParse { .. })
        ));
    }

    #[test]
    fn page_without_size_fails_at_region_finalize() {
        let result = Atlas::parse("page.png\nhead\n  xy: 0,0\n  size: 1,1\n");
        assert!(matches!(result, Err(Error::AtlasParse { .. })));
    }

    #[test]
    fn malformed_region_attribute_is_an_error() {
        let result = Atlas::parse("page.png\nsize: 8,8\n\nhead\n  xy: nope\n");
        assert!(matches!(result, Err(Error::AtlasParse { .. })));
    }
}
