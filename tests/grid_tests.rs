use ndarray::{array, Array2, ArrayD, IxDyn};
use netcdf::open;
use tempfile::tempdir;
use um_regrid::array::{Coordinate, DataArray};
use um_regrid::errors::{Result, UmRegridError};
use um_regrid::grid::{identify, identify_grid, Grid};

fn rectilinear_array(lat_units: &str) -> DataArray {
    DataArray::new(["lat", "lon"], ArrayD::<f64>::zeros(IxDyn(&[3, 4])))
        .unwrap()
        .with_coord(Coordinate::from_1d("lat", vec![-30.0, 0.0, 30.0]).with_attr("units", lat_units))
        .unwrap()
        .with_coord(Coordinate::from_1d("lon", vec![0.0, 90.0, 180.0, 270.0]).with_attr("units", "degrees_east"))
        .unwrap()
}

fn curvilinear_array() -> DataArray {
    let lats = Array2::from_shape_fn((2, 3), |(j, i)| -10.0 + 20.0 * j as f64 + i as f64);
    let lons = Array2::from_shape_fn((2, 3), |(j, i)| 100.0 + 10.0 * i as f64 + j as f64);
    DataArray::new(["time", "y", "x"], ArrayD::<f64>::zeros(IxDyn(&[5, 2, 3])))
        .unwrap()
        .with_coord(Coordinate::new("nav_lat", ["y", "x"], lats.into_dyn()).with_attr("units", "degrees_N"))
        .unwrap()
        .with_coord(Coordinate::new("nav_lon", ["y", "x"], lons.into_dyn()).with_attr("units", "degrees_E"))
        .unwrap()
}

#[test]
fn test_identify_rectilinear() -> Result<()> {
    let found = identify(&rectilinear_array("degrees_north"))?;
    assert_eq!(found.y_dim, "lat");
    assert_eq!(found.x_dim, "lon");
    assert!(found.grid.is_rectilinear());
    assert_eq!(found.grid.shape(), (3, 4));
    assert!(!found.grid.has_bounds());
    Ok(())
}

#[test]
fn test_identify_by_units_not_name() -> Result<()> {
    let array = DataArray::new(["row", "col"], ArrayD::<f64>::zeros(IxDyn(&[2, 2])))?
        .with_coord(Coordinate::from_1d("row", vec![10.0, 20.0]).with_attr("units", "degree_north"))?
        .with_coord(Coordinate::from_1d("col", vec![5.0, 15.0]).with_attr("units", "degree_east"))?;
    let found = identify(&array)?;
    assert_eq!((found.y_dim.as_str(), found.x_dim.as_str()), ("row", "col"));
    Ok(())
}

#[test]
fn test_unrecognised_units_are_rejected() {
    let err = identify_grid(&rectilinear_array("radians")).unwrap_err();
    assert!(matches!(err, UmRegridError::GridIdentificationError(_)));
}

#[test]
fn test_missing_coordinates_are_rejected() {
    let bare = DataArray::new(["y", "x"], ArrayD::<f64>::zeros(IxDyn(&[2, 2]))).unwrap();
    let err = identify_grid(&bare).unwrap_err();
    assert!(matches!(err, UmRegridError::GridIdentificationError(_)));
}

#[test]
fn test_identify_curvilinear() -> Result<()> {
    let found = identify(&curvilinear_array())?;
    assert_eq!((found.y_dim.as_str(), found.x_dim.as_str()), ("y", "x"));
    let Grid::Curvilinear(grid) = &found.grid else {
        panic!("expected a curvilinear grid");
    };
    assert_eq!(grid.lats()[[1, 2]], 12.0);
    assert_eq!(grid.lons()[[1, 2]], 121.0);
    Ok(())
}

#[test]
fn test_rectilinear_bounds_become_vertices() -> Result<()> {
    let lat = Coordinate::from_1d("lat", vec![-45.0, 45.0])
        .with_attr("units", "degrees_north")
        .with_bounds(array![[-90.0, 0.0], [0.0, 90.0]].into_dyn());
    let lon = Coordinate::from_1d("lon", vec![90.0, 270.0])
        .with_attr("units", "degrees_east")
        .with_bounds(array![[0.0, 180.0], [180.0, 360.0]].into_dyn());
    let array = DataArray::new(["lat", "lon"], ArrayD::<f64>::zeros(IxDyn(&[2, 2])))?
        .with_coord(lat)?
        .with_coord(lon)?;

    let grid = identify_grid(&array)?;
    assert!(grid.has_bounds());
    let (lat_c, lon_c) = grid.cell_corners()?;
    assert_eq!(lat_c.row(0).to_vec(), vec![-90.0, -90.0, 0.0, 0.0]);
    assert_eq!(lon_c.row(3).to_vec(), vec![180.0, 360.0, 360.0, 180.0]);
    Ok(())
}

#[test]
fn test_overlapping_bounds_are_invalid() {
    let lat = Coordinate::from_1d("lat", vec![-45.0, 45.0])
        .with_attr("units", "degrees_north")
        .with_bounds(array![[-90.0, 10.0], [0.0, 90.0]].into_dyn());
    let lon = Coordinate::from_1d("lon", vec![0.0]).with_attr("units", "degrees_east");
    let array = DataArray::new(["lat", "lon"], ArrayD::<f64>::zeros(IxDyn(&[2, 1])))
        .unwrap()
        .with_coord(lat)
        .unwrap()
        .with_coord(lon)
        .unwrap();
    let err = identify_grid(&array).unwrap_err();
    assert!(matches!(err, UmRegridError::InvalidGrid(_)));
}

#[test]
fn test_derived_corners_clamp_poles_and_wrap() -> Result<()> {
    let grid = Grid::rectilinear(vec![-60.0, 0.0, 60.0], vec![0.0, 120.0, 240.0])?;
    let (lat_c, lon_c) = grid.cell_corners()?;
    assert_eq!(lat_c.shape(), &[9, 4]);
    // First cell spans the south pole to halfway to the equator
    assert_eq!(lat_c.row(0).to_vec(), vec![-90.0, -90.0, -30.0, -30.0]);
    // And straddles the meridian
    assert_eq!(lon_c.row(0).to_vec(), vec![300.0, 60.0, 60.0, 300.0]);
    Ok(())
}

#[test]
fn test_invalid_grids() {
    assert!(Grid::rectilinear(vec![0.0, 0.0], vec![0.0]).is_err());
    assert!(Grid::rectilinear(Vec::<f64>::new(), vec![0.0]).is_err());
    assert!(Grid::curvilinear(Array2::zeros((2, 2)), Array2::zeros((2, 3))).is_err());
}

#[test]
fn test_curvilinear_without_bounds_has_no_corners() {
    let grid = identify_grid(&curvilinear_array()).unwrap();
    let err = grid.cell_corners().unwrap_err();
    assert!(matches!(err, UmRegridError::UnsupportedGridError(_)));
}

#[test]
fn test_scrip_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("grid.nc");
    let grid = Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 90.0, 180.0])?;
    grid.to_scrip(&path)?;

    let file = open(&path)?;
    let dims = file.variable("grid_dims").expect("grid_dims");
    assert_eq!(dims.get_values::<i32, _>(..)?, vec![3, 2]);
    let centre_lon = file.variable("grid_center_lon").expect("grid_center_lon");
    assert_eq!(centre_lon.get_values::<f64, _>(..)?, vec![0.0, 90.0, 180.0, 0.0, 90.0, 180.0]);
    let corners = file.variable("grid_corner_lat").expect("grid_corner_lat");
    assert_eq!(corners.get_values::<f64, _>(..)?.len(), 24);
    Ok(())
}

#[test]
fn test_sample_file_masks_cells() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("sample.nc");
    let grid = Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 180.0])?;
    let mask = array![[true, false], [true, true]];
    grid.to_netcdf(&path, Some(&mask))?;

    let file = open(&path)?;
    let sample = file.variable("sample").expect("sample");
    let values = sample.get_values::<f64, _>(..)?;
    assert_eq!(values[1], um_regrid::grid::cdo::SAMPLE_FILL_VALUE);
    assert_eq!(values[0], 0.0);
    Ok(())
}

#[test]
fn test_grid_coordinates_identify_back() -> Result<()> {
    let grid = Grid::rectilinear(vec![-45.0, 45.0], vec![0.0, 180.0])?;
    let (lat, lon) = grid.coordinates();
    let array = DataArray::new(["lat", "lon"], ArrayD::<f64>::zeros(IxDyn(&[2, 2])))?
        .with_coord(lat)?
        .with_coord(lon)?;
    assert_eq!(identify_grid(&array)?, grid);
    Ok(())
}

#[test]
fn test_two_longitude_coordinates_are_ambiguous() {
    let second_lon = Coordinate::new("glon", ["lon"], ndarray::Array1::from(vec![0.0, 90.0, 180.0, 270.0]).into_dyn())
        .with_attr("units", "degree_E");
    let array = rectilinear_array("degrees_north").with_coord(second_lon).unwrap();
    let err = identify_grid(&array).unwrap_err();
    assert!(matches!(err, UmRegridError::GridIdentificationError(_)));
}
