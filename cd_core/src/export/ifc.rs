//! IFC2X3 export as a STEP physical file.
//!
//! Spatial tree: project → site → building → storey, with spaces aggregated
//! to the storey and walls, openings, doors and windows contained in it.
//! Every container sits at the origin, so element placements are absolute
//! millimetre coordinates. GlobalIds are name-based UUIDs over the revision
//! and element id, compressed to the 22-character IFC alphabet.

use std::fmt::Write as _;

use uuid::Uuid;

use crate::errors::{CdError, CdResult};
use crate::geometry::{Bounds, Rect, Vec2};
use crate::model::{ProjectModel, PLANSET_NAMESPACE};
use crate::plan::OpeningKind;

use super::step::{self, StepFile, StepValue};
use super::verify::FormatSummary;

const IFC_ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

/// Compress a UUID into the 22-character IFC GlobalId form
pub fn compress_guid(uuid: Uuid) -> String {
    let n = uuid.as_u128();
    let mut out = String::with_capacity(22);
    out.push(IFC_ALPHABET[(n >> 126) as usize] as char);
    for i in (0..21).rev() {
        out.push(IFC_ALPHABET[((n >> (i * 6)) & 0x3f) as usize] as char);
    }
    out
}

fn quoted(s: &str) -> String {
    format!("'{}'", step::encode_string(s))
}

fn real(v: f64) -> String {
    format!("{:.3}", v)
}

fn refs(ids: &[u64]) -> String {
    let items: Vec<String> = ids.iter().map(|id| format!("#{}", id)).collect();
    format!("({})", items.join(","))
}

struct IfcWriter {
    out: String,
    next: u64,
    revision: Uuid,
    owner: u64,
}

impl IfcWriter {
    fn add(&mut self, body: impl AsRef<str>) -> u64 {
        let id = self.next;
        self.next += 1;
        let _ = writeln!(self.out, "#{}={};", id, body.as_ref());
        id
    }

    fn guid(&self, key: &str) -> String {
        let name = format!("{}/{}", self.revision, key);
        quoted(&compress_guid(Uuid::new_v5(&PLANSET_NAMESPACE, name.as_bytes())))
    }

    fn point3(&mut self, x: f64, y: f64, z: f64) -> u64 {
        self.add(format!("IFCCARTESIANPOINT(({},{},{}))", real(x), real(y), real(z)))
    }

    fn placement(&mut self, x: f64, y: f64, z: f64) -> u64 {
        let origin = self.point3(x, y, z);
        let axis = self.add(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", origin));
        self.add(format!("IFCLOCALPLACEMENT($,#{})", axis))
    }

    /// Box body: rectangle profile with its corner at the placement origin
    fn extruded_box(&mut self, context: u64, w: f64, d: f64, depth: f64) -> u64 {
        let centre = self.add(format!("IFCCARTESIANPOINT(({},{}))", real(w / 2.0), real(d / 2.0)));
        let position = self.add(format!("IFCAXIS2PLACEMENT2D(#{},$)", centre));
        let profile = self.add(format!(
            "IFCRECTANGLEPROFILEDEF(.AREA.,$,#{},{},{})",
            position,
            real(w),
            real(d)
        ));
        let origin = self.point3(0.0, 0.0, 0.0);
        let solid_pos = self.add(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", origin));
        let up = self.add("IFCDIRECTION((0.,0.,1.))");
        let solid = self.add(format!(
            "IFCEXTRUDEDAREASOLID(#{},#{},#{},{})",
            profile,
            solid_pos,
            up,
            real(depth)
        ));
        let rep = self.add(format!("IFCSHAPEREPRESENTATION(#{},'Body','SweptSolid',(#{}))", context, solid));
        self.add(format!("IFCPRODUCTDEFINITIONSHAPE($,$,(#{}))", rep))
    }

    fn relation(&mut self, kind: &str, key: &str, tail: String) -> u64 {
        let guid = self.guid(key);
        let owner = self.owner;
        self.add(format!("{}({},#{},$,$,{})", kind, guid, owner, tail))
    }

    fn property_set(&mut self, key: &str, object: u64, name: &str, props: &[(&str, String)]) {
        let ids: Vec<u64> = props
            .iter()
            .map(|(prop, value)| self.add(format!("IFCPROPERTYSINGLEVALUE({},$,{},$)", quoted(prop), value)))
            .collect();
        let pset_guid = self.guid(&format!("{}/pset", key));
        let owner = self.owner;
        let pset = self.add(format!(
            "IFCPROPERTYSET({},#{},{},$,{})",
            pset_guid,
            owner,
            quoted(name),
            refs(&ids)
        ));
        self.relation(
            "IFCRELDEFINESBYPROPERTIES",
            &format!("{}/pset-rel", key),
            format!("(#{}),#{}", object, pset),
        );
    }
}

/// Render the model as an IFC2X3 STEP file
pub(super) fn write_ifc(model: &ProjectModel, file_name: &str) -> String {
    let config = &model.config;
    let plan = &model.plan;
    let issue = config.issue_date.unwrap_or_default();
    let timestamp = issue.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
    let storey_height = config.views.floor_height_m * 1000.0;

    let mut out = String::new();
    out.push_str("ISO-10303-21;\nHEADER;\n");
    out.push_str("FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n");
    let _ = writeln!(
        out,
        "FILE_NAME({},'{}T00:00:00',({}),({}),'planset','planset {}','');",
        quoted(file_name),
        issue.format("%Y-%m-%d"),
        quoted(&config.title.drawn_by),
        quoted(&config.title.client),
        env!("CARGO_PKG_VERSION")
    );
    out.push_str("FILE_SCHEMA(('IFC2X3'));\nENDSEC;\nDATA;\n");

    let mut w = IfcWriter {
        out,
        next: 1,
        revision: model.revision_id,
        owner: 0,
    };

    // Ownership
    let person = w.add(format!("IFCPERSON($,{},$,$,$,$,$,$)", quoted(&config.title.drawn_by)));
    let org = w.add("IFCORGANIZATION($,'Planset',$,$,$)");
    let person_org = w.add(format!("IFCPERSONANDORGANIZATION(#{},#{},$)", person, org));
    let app = w.add(format!(
        "IFCAPPLICATION(#{},'{}','Planset','planset')",
        org,
        env!("CARGO_PKG_VERSION")
    ));
    w.owner = w.add(format!(
        "IFCOWNERHISTORY(#{},#{},$,.ADDED.,$,$,$,{})",
        person_org, app, timestamp
    ));

    // Units and context
    let length = w.add("IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.)");
    let area = w.add("IFCSIUNIT(*,.AREAUNIT.,$,.SQUARE_METRE.)");
    let angle = w.add("IFCSIUNIT(*,.PLANEANGLEUNIT.,$,.RADIAN.)");
    let units = w.add(format!("IFCUNITASSIGNMENT({})", refs(&[length, area, angle])));
    let world_origin = w.point3(0.0, 0.0, 0.0);
    let world_axis = w.add(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", world_origin));
    let context = w.add(format!(
        "IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#{},$)",
        world_axis
    ));

    // Spatial tree
    let project_guid = w.guid("project");
    let owner = w.owner;
    let project = w.add(format!(
        "IFCPROJECT({},#{},{},$,$,{},$,(#{}),#{})",
        project_guid,
        owner,
        quoted(&model.project_id),
        quoted(&config.title.project_name),
        context,
        units
    ));
    let site_place = w.placement(0.0, 0.0, 0.0);
    let site_guid = w.guid("site");
    let site = w.add(format!(
        "IFCSITE({},#{},'Site',$,$,#{},$,$,.ELEMENT.,$,$,$,$,$)",
        site_guid, owner, site_place
    ));
    let building_place = w.placement(0.0, 0.0, 0.0);
    let building_guid = w.guid("building");
    let building = w.add(format!(
        "IFCBUILDING({},#{},{},$,$,#{},$,$,.ELEMENT.,$,$,$)",
        building_guid,
        owner,
        quoted(&config.title.project_name),
        building_place
    ));
    let storey_place = w.placement(0.0, 0.0, 0.0);
    let storey_guid = w.guid("storey");
    let storey = w.add(format!(
        "IFCBUILDINGSTOREY({},#{},'Level 1',$,$,#{},$,$,.ELEMENT.,0.)",
        storey_guid, owner, storey_place
    ));
    w.relation("IFCRELAGGREGATES", "project-site", format!("#{},(#{})", project, site));
    w.relation("IFCRELAGGREGATES", "site-building", format!("#{},(#{})", site, building));
    w.relation("IFCRELAGGREGATES", "building-storey", format!("#{},(#{})", building, storey));

    // Spaces
    let mut spaces = Vec::new();
    for room in &plan.rooms {
        let r = room.rect;
        let height = model
            .program
            .rooms
            .get(room.requirement)
            .map(|req| req.ceiling_height_m * 1000.0)
            .unwrap_or(storey_height);
        let place = w.placement(r.x as f64, r.y as f64, 0.0);
        let shape = w.extruded_box(context, r.w as f64, r.h as f64, height);
        let guid = w.guid(&room.id);
        let space = w.add(format!(
            "IFCSPACE({},#{},{},$,$,#{},#{},{},.ELEMENT.,.INTERNAL.,$)",
            guid,
            owner,
            quoted(&room.number),
            place,
            shape,
            quoted(&room.name)
        ));
        w.property_set(
            &room.id,
            space,
            "Pset_SpaceCommon",
            &[
                ("Name", format!("IFCLABEL({})", quoted(&room.name))),
                ("Area", format!("IFCAREAMEASURE({})", real(room.area_m2))),
            ],
        );
        spaces.push(space);
    }
    if !spaces.is_empty() {
        w.relation("IFCRELAGGREGATES", "storey-spaces", format!("#{},{}", storey, refs(&spaces)));
    }

    // Walls
    let mut contained = Vec::new();
    let mut wall_ids = std::collections::BTreeMap::new();
    for wall in &plan.walls {
        let body = wall.body();
        let place = w.placement(body.x as f64, body.y as f64, 0.0);
        let shape = w.extruded_box(context, body.w as f64, body.h as f64, storey_height);
        let guid = w.guid(&wall.id);
        let id = w.add(format!(
            "IFCWALLSTANDARDCASE({},#{},{},$,$,#{},#{},{})",
            guid,
            owner,
            quoted(&wall.id),
            place,
            shape,
            quoted(&wall.id)
        ));
        wall_ids.insert(wall.id.as_str(), id);
        contained.push(id);
    }

    // Openings and their fillings
    for opening in &plan.openings {
        let (Some(wall), Some(&wall_entity)) = (plan.wall(&opening.wall_id), wall_ids.get(opening.wall_id.as_str()))
        else {
            continue;
        };
        let body = wall.span_body(opening.offset_mm, opening.offset_mm + opening.width_mm);
        let sill = opening.sill_mm as f64;
        let height = opening.height_mm() as f64;

        let place = w.placement(body.x as f64, body.y as f64, sill);
        let shape = w.extruded_box(context, body.w as f64, body.h as f64, height);
        let void_guid = w.guid(&format!("{}/void", opening.id));
        let void = w.add(format!(
            "IFCOPENINGELEMENT({},#{},{},$,'Opening',#{},#{},$)",
            void_guid,
            owner,
            quoted(&opening.id),
            place,
            shape
        ));
        w.relation(
            "IFCRELVOIDSELEMENT",
            &format!("{}/voids", opening.id),
            format!("#{},#{}", wall_entity, void),
        );

        let kind = match opening.kind {
            OpeningKind::Door => "IFCDOOR",
            OpeningKind::Window => "IFCWINDOW",
        };
        let fill_place = w.placement(body.x as f64, body.y as f64, sill);
        let guid = w.guid(&opening.id);
        let fill = w.add(format!(
            "{}({},#{},{},$,{},#{},$,{},{},{})",
            kind,
            guid,
            owner,
            quoted(&opening.id),
            quoted(opening.type_label()),
            fill_place,
            quoted(&opening.id),
            real(height),
            real(opening.width_mm as f64)
        ));
        w.relation(
            "IFCRELFILLSELEMENT",
            &format!("{}/fills", opening.id),
            format!("#{},#{}", void, fill),
        );
        w.property_set(
            &opening.id,
            fill,
            if opening.kind == OpeningKind::Door { "Pset_DoorCommon" } else { "Pset_WindowCommon" },
            &[
                ("Width", format!("IFCPOSITIVELENGTHMEASURE({})", real(opening.width_mm as f64))),
                ("Height", format!("IFCPOSITIVELENGTHMEASURE({})", real(height))),
            ],
        );
        contained.push(fill);
    }

    if !contained.is_empty() {
        w.relation(
            "IFCRELCONTAINEDINSPATIALSTRUCTURE",
            "storey-contents",
            format!("{},#{}", refs(&contained), storey),
        );
    }

    let mut out = w.out;
    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    out
}

// ============================================================================
// Reader
// ============================================================================

fn space_extent(file: &StepFile, space: &step::StepEntity) -> Option<Rect> {
    let placement = file.follow(space, 5)?;
    let axis = file.follow(placement, 1)?;
    let origin = file.follow(axis, 0)?;
    let coords = origin.attr(0)?.as_list()?;
    let x = coords.first()?.as_num()?;
    let y = coords.get(1)?.as_num()?;

    let shape = file.follow(space, 6)?;
    let rep_id = shape.attr(2)?.as_list()?.first()?.as_ref_id()?;
    let rep = file.get(rep_id)?;
    let solid_id = rep.attr(3)?.as_list()?.first()?.as_ref_id()?;
    let solid = file.get(solid_id)?;
    let profile = file.follow(solid, 0)?;
    let w = profile.attr(3)?.as_num()?;
    let d = profile.attr(4)?.as_num()?;
    Some(Rect::new(x.round() as i64, y.round() as i64, w.round() as i64, d.round() as i64))
}

/// Parse an exported file back and summarize it
pub(super) fn read_summary(bytes: &[u8]) -> CdResult<FormatSummary> {
    let text = std::str::from_utf8(bytes).map_err(|e| CdError::export("bim", e.to_string()))?;
    let file = step::parse(text)?;

    let mut names = Vec::new();
    let mut bounds = Bounds::empty();
    for space in file.of_kind("IFCSPACE") {
        let name = space
            .attr(7)
            .and_then(StepValue::as_str)
            .ok_or_else(|| CdError::export("bim", format!("#{} has no long name", space.id)))?;
        names.push(name.to_string());
        let extent = space_extent(&file, space)
            .ok_or_else(|| CdError::export("bim", format!("#{} has no readable geometry", space.id)))?;
        bounds.include(Vec2::new(extent.x as f64, extent.y as f64));
        bounds.include(Vec2::new(extent.max_x() as f64, extent.max_y() as f64));
    }
    names.sort();

    let (w, d) = if bounds.is_empty() {
        (0.0, 0.0)
    } else {
        (bounds.width() / 1000.0, bounds.height() / 1000.0)
    };
    Ok(FormatSummary {
        sheets: None,
        rooms: Some(names.len()),
        room_names: Some(names),
        walls: Some(file.of_kind("IFCWALLSTANDARDCASE").count()),
        openings: Some(file.of_kind("IFCDOOR").count() + file.of_kind("IFCWINDOW").count()),
        envelope_w_m: Some(w),
        envelope_d_m: Some(d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_guid() {
        assert_eq!(compress_guid(Uuid::nil()), "0000000000000000000000");
        assert_eq!(compress_guid(Uuid::from_u128(u128::MAX)), "3$$$$$$$$$$$$$$$$$$$$$");
        let id = compress_guid(Uuid::new_v5(&PLANSET_NAMESPACE, b"RM-101"));
        assert_eq!(id.len(), 22);
        assert!(id.bytes().all(|b| IFC_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_space_geometry_reads_back() {
        let mut w = IfcWriter {
            out: String::new(),
            next: 1,
            revision: Uuid::nil(),
            owner: 0,
        };
        let place = w.placement(1000.0, 2000.0, 0.0);
        let shape = w.extruded_box(99, 4000.0, 3000.0, 2700.0);
        w.add(format!(
            "IFCSPACE('x',$,'101',$,$,#{},#{},'Living',.ELEMENT.,.INTERNAL.,$)",
            place, shape
        ));
        let text = format!("ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n{}ENDSEC;\nEND-ISO-10303-21;\n", w.out);
        let summary = read_summary(text.as_bytes()).unwrap();
        assert_eq!(summary.rooms, Some(1));
        assert_eq!(summary.room_names, Some(vec!["Living".to_string()]));
        assert_eq!(summary.envelope_w_m, Some(4.0));
        assert_eq!(summary.envelope_d_m, Some(3.0));
        assert_eq!(summary.walls, Some(0));
    }
}
