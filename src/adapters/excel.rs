use crate::utils::error::{PipelineError, Result};
use crate::utils::timer::Stopwatch;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use umya_spreadsheet::{reader, writer, Spreadsheet, Worksheet};

/// 1-based 欄索引轉 Excel 欄字母：1 -> A、27 -> AA
pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = ((index - 1) % 26) as u8;
        letters.push(b'A' + rem);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ASCII letters")
}

/// Excel 欄字母轉 1-based 欄索引：A -> 1、AA -> 27
pub fn column_index(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(PipelineError::excel("empty column letters"));
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return Err(PipelineError::excel(format!(
                "invalid column letters '{}': expected A-Z",
                letters
            )));
        }
        index = index * 26 + (c as u32 - 'A' as u32 + 1);
    }
    Ok(index)
}

/// 拆解儲存格座標："AB12" -> ("AB", 12)
pub fn split_cell_ref(cell: &str) -> Result<(String, u32)> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits: String = cell.chars().skip(letters.len()).collect();

    if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PipelineError::excel(format!(
            "invalid cell reference '{}'",
            cell
        )));
    }
    let row: u32 = digits
        .parse()
        .map_err(|_| PipelineError::excel(format!("invalid row number in '{}'", cell)))?;
    Ok((letters.to_ascii_uppercase(), row))
}

/// 展開矩形範圍（欄優先順序）："A1".."B2" -> [A1, A2, B1, B2]
pub fn cell_range(start: &str, end: &str) -> Result<Vec<String>> {
    let (start_col, start_row) = split_cell_ref(start)?;
    let (end_col, end_row) = split_cell_ref(end)?;

    let start_idx = column_index(&start_col)?;
    let end_idx = column_index(&end_col)?;

    let mut cells = Vec::new();
    for col in start_idx..=end_idx {
        let letters = column_letter(col);
        for row in start_row..=end_row {
            cells.push(format!("{}{}", letters, row));
        }
    }
    Ok(cells)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellScalar {
    Text(String),
    Number(f64),
}

/// 一列輸出資料：欄位名 -> 值
pub type SheetRow = BTreeMap<String, CellScalar>;

/// 單一資料來源更新一張工作表的設定
#[derive(Debug, Clone, Default)]
pub struct SheetUpdate {
    pub sheet: String,
    /// Excel 欄字母 -> 欄位名
    pub column_mapping: BTreeMap<String, String>,
    /// 已知含公式的欄位，收集公式時一併掃描
    pub known_formula_columns: Vec<String>,
}

/// 多資料來源寫入同一張工作表時的對應
#[derive(Debug, Clone)]
pub struct SourceMapping {
    pub data_source: String,
    pub column_mapping: BTreeMap<String, String>,
    pub known_formula_columns: Vec<String>,
}

/// 在既有的 Excel 範本上就地更新資料，保留儲存格公式。
///
/// 流程與公式保護規則：
/// 1. 載入範本，輸出到 `{原檔名}_update.xlsx`
/// 2. 收集對應欄位與已知公式欄位中的公式
/// 3. 清掉對應欄位的舊值（公式格跳過）
/// 4. 從第 2 列起寫入新資料（公式格跳過，第 1 列保留表頭）
/// 5. 重寫表頭列與更新列上的公式
pub struct WorkbookUpdater;

impl WorkbookUpdater {
    pub fn update_workbook(
        template: &Path,
        rows: &[SheetRow],
        updates: &[SheetUpdate],
    ) -> Result<PathBuf> {
        let (output_path, mut book) = load_template(template)?;

        for update in updates {
            let Some(sheet) = book.get_sheet_by_name_mut(&update.sheet) else {
                tracing::warn!("Sheet '{}' not found in workbook, skipping", update.sheet);
                continue;
            };

            if rows.is_empty() {
                tracing::warn!("No data rows for sheet '{}', skipping", update.sheet);
                continue;
            }

            let mut columns_to_check: BTreeSet<String> =
                update.column_mapping.keys().cloned().collect();
            columns_to_check.extend(update.known_formula_columns.iter().cloned());

            let formulas = collect_formulas(sheet, &columns_to_check)?;
            clear_old_data(sheet, &update.column_mapping, &formulas)?;
            let updated_rows = write_rows(sheet, rows, &update.column_mapping, &formulas)?;
            restore_formulas(sheet, &formulas, &updated_rows)?;
        }

        save_workbook(&book, &output_path)?;
        Ok(output_path)
    }

    /// 多個資料來源一次更新；同一張表的公式只收集與還原一次
    pub fn update_workbook_multi(
        template: &Path,
        data_sources: &BTreeMap<String, Vec<SheetRow>>,
        sheet_updates: &BTreeMap<String, Vec<SourceMapping>>,
    ) -> Result<PathBuf> {
        let (output_path, mut book) = load_template(template)?;

        for (sheet_name, mappings) in sheet_updates {
            let Some(sheet) = book.get_sheet_by_name_mut(sheet_name) else {
                tracing::warn!("Sheet '{}' not found in workbook, skipping", sheet_name);
                continue;
            };

            let mut columns_to_check = BTreeSet::new();
            for mapping in mappings {
                columns_to_check.extend(mapping.column_mapping.keys().cloned());
                columns_to_check.extend(mapping.known_formula_columns.iter().cloned());
            }

            let formulas = collect_formulas(sheet, &columns_to_check)?;
            let mut all_updated_rows = BTreeSet::new();

            for mapping in mappings {
                let Some(rows) = data_sources.get(&mapping.data_source) else {
                    tracing::warn!("Data source '{}' not provided, skipping", mapping.data_source);
                    continue;
                };
                if rows.is_empty() {
                    tracing::warn!("Data source '{}' is empty, skipping", mapping.data_source);
                    continue;
                }

                clear_old_data(sheet, &mapping.column_mapping, &formulas)?;
                let updated = write_rows(sheet, rows, &mapping.column_mapping, &formulas)?;
                all_updated_rows.extend(updated);
            }

            restore_formulas(sheet, &formulas, &all_updated_rows)?;
        }

        save_workbook(&book, &output_path)?;
        Ok(output_path)
    }

    /// 讀取工作表內容：(表頭, 資料列)，可選擇只取部分欄位
    pub fn read_sheet(
        path: &Path,
        sheet_name: &str,
        usecols: Option<&[String]>,
    ) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let book = reader::xlsx::read(path)
            .map_err(|e| PipelineError::excel(format!("cannot read '{}': {}", path.display(), e)))?;
        let sheet = book.get_sheet_by_name(sheet_name).ok_or_else(|| {
            PipelineError::excel(format!("sheet '{}' not found in '{}'", sheet_name, path.display()))
        })?;

        let highest_col = sheet.get_highest_column();
        let highest_row = sheet.get_highest_row();

        let column_indices: Vec<u32> = match usecols {
            Some(letters) => letters
                .iter()
                .map(|l| column_index(l))
                .collect::<Result<Vec<_>>>()?,
            None => (1..=highest_col).collect(),
        };

        let read_cell = |col: u32, row: u32| -> String {
            sheet
                .get_cell((col, row))
                .map(|c| c.get_value().to_string())
                .unwrap_or_default()
        };

        let header: Vec<String> = column_indices.iter().map(|&c| read_cell(c, 1)).collect();
        let rows: Vec<Vec<String>> = (2..=highest_row)
            .map(|row| column_indices.iter().map(|&c| read_cell(c, row)).collect())
            .collect();

        Ok((header, rows))
    }
}

fn load_template(template: &Path) -> Result<(PathBuf, Spreadsheet)> {
    let watch = Stopwatch::start(format!("Loading workbook {}", template.display()));

    if !template.exists() {
        return Err(PipelineError::excel(format!(
            "Excel template not found: {}",
            template.display()
        )));
    }

    let stem = template
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::excel("template path has no file name"))?;
    let ext = template.extension().and_then(|e| e.to_str()).unwrap_or("xlsx");
    let output_path = template.with_file_name(format!("{}_update.{}", stem, ext));

    let book = reader::xlsx::read(template)
        .map_err(|e| PipelineError::excel(format!("cannot read '{}': {}", template.display(), e)))?;

    watch.finish();
    Ok((output_path, book))
}

fn collect_formulas(
    sheet: &Worksheet,
    columns: &BTreeSet<String>,
) -> Result<HashMap<String, String>> {
    let watch = Stopwatch::start("Collecting formulas");
    let highest_row = sheet.get_highest_row();

    let mut formulas = HashMap::new();
    for letters in columns {
        let col = column_index(letters)?;
        for row in 1..=highest_row {
            if let Some(cell) = sheet.get_cell((col, row)) {
                let formula = cell.get_formula();
                if !formula.is_empty() {
                    formulas.insert(format!("{}{}", letters, row), formula.to_string());
                }
            }
        }
    }

    tracing::debug!("Found {} formula cells", formulas.len());
    watch.finish();
    Ok(formulas)
}

fn clear_old_data(
    sheet: &mut Worksheet,
    column_mapping: &BTreeMap<String, String>,
    formulas: &HashMap<String, String>,
) -> Result<usize> {
    let watch = Stopwatch::start("Clearing old data");
    let highest_row = sheet.get_highest_row();

    let mut cleared = 0;
    for row in 2..=highest_row {
        for letters in column_mapping.keys() {
            let coord = format!("{}{}", letters, row);
            if formulas.contains_key(&coord) {
                continue;
            }
            let col = column_index(letters)?;
            sheet.get_cell_mut((col, row)).set_value("");
            cleared += 1;
        }
    }

    tracing::debug!("Cleared {} cells", cleared);
    watch.finish();
    Ok(cleared)
}

fn write_rows(
    sheet: &mut Worksheet,
    rows: &[SheetRow],
    column_mapping: &BTreeMap<String, String>,
    formulas: &HashMap<String, String>,
) -> Result<BTreeSet<u32>> {
    let watch = Stopwatch::start("Writing data");

    let mut updated_rows = BTreeSet::new();
    let mut written = 0;
    for (idx, data_row) in rows.iter().enumerate() {
        // 第 1 列是表頭，資料從第 2 列開始
        let excel_row = idx as u32 + 2;
        updated_rows.insert(excel_row);

        for (letters, field) in column_mapping {
            let coord = format!("{}{}", letters, excel_row);
            if formulas.contains_key(&coord) {
                continue;
            }
            let Some(value) = data_row.get(field) else {
                continue;
            };

            let col = column_index(letters)?;
            let cell = sheet.get_cell_mut((col, excel_row));
            match value {
                CellScalar::Text(text) => {
                    cell.set_value_string(text.clone());
                }
                CellScalar::Number(number) => {
                    cell.set_value_number(*number);
                }
            }
            written += 1;
        }
    }

    tracing::debug!("Wrote {} cells across {} rows", written, updated_rows.len());
    watch.finish();
    Ok(updated_rows)
}

fn restore_formulas(
    sheet: &mut Worksheet,
    formulas: &HashMap<String, String>,
    updated_rows: &BTreeSet<u32>,
) -> Result<usize> {
    let watch = Stopwatch::start("Restoring formulas");

    let mut restored = 0;
    for (coord, formula) in formulas {
        let (letters, row) = split_cell_ref(coord)?;
        if row == 1 || updated_rows.contains(&row) {
            let col = column_index(&letters)?;
            sheet.get_cell_mut((col, row)).set_formula(formula.clone());
            restored += 1;
        }
    }

    tracing::debug!("Restored {} formulas", restored);
    watch.finish();
    Ok(restored)
}

fn save_workbook(book: &Spreadsheet, path: &Path) -> Result<()> {
    let watch = Stopwatch::start(format!("Saving workbook {}", path.display()));
    writer::xlsx::write(book, path)
        .map_err(|e| PipelineError::excel(format!("cannot save '{}': {}", path.display(), e)))?;
    watch.finish();
    Ok(())
}
