//! Instruction text for each reasoning stage.
//!
//! The clinical priority rules live here as prose for the model to follow;
//! nothing in this module evaluates them.

/// Substituted for an empty web context.
pub const NO_WEB_CONTEXT: &str = "None";

pub const DISCLAIMER: &str =
    "This assessment is clinical decision support and does not replace the judgment of a treating clinician.";

const REASONING_RULES: &str = "\
DIAGNOSTIC REASONING RULES:
1. Give PATHOGNOMONIC and highly specific findings heavy weight. One pathognomonic finding should move the probabilities sharply.
2. Reason over the FULL CONSTELLATION of findings together instead of matching symptoms one at a time.
3. Do not fall back to the most common diagnosis when rare but specific findings point elsewhere.
4. Movement disorders (dyskinesia, dystonia, choreoathetosis) together with psychiatric symptoms point toward autoimmune or antibody-mediated causes.
5. Near-pathognomonic EEG patterns such as extreme delta brush deserve matching weight.
6. Age, sex and symptom pattern interact: a young woman with psychiatric symptoms, seizures and a movement disorder has autoimmune encephalitis until proven otherwise.
7. Bilateral symmetric MRI findings carry different implications from unilateral ones.

PATTERNS TO RECOGNISE:
- Psychiatric symptoms + seizures + movement disorder in a young woman: anti-NMDA receptor encephalitis rather than HSV encephalitis
- Unilateral temporal lobe involvement with haemorrhagic change: HSV encephalitis
- Bilateral medial temporal involvement with limbic symptoms: autoimmune or limbic encephalitis
- Rapidly progressive dementia with myoclonus: prion disease
- Ring-enhancing lesions in an immunosuppressed patient: toxoplasmosis or lymphoma

For each candidate diagnosis give:
1. **Condition** and a likelihood percentage
2. **Discriminating findings** that favour it over the alternatives
3. **Against**: findings that fit poorly or are atypical
4. **Critical rule-outs**: dangerous conditions that must be excluded
5. **Pre-test probability** reasoning in Bayesian terms

Rank 3 to 5 diagnoses. Always include at least one serious or life-threatening diagnosis that must be ruled out, even when it is unlikely.

Ground the percentages in demographics and risk factors, in the SPECIFICITY of each finding (rare or pathognomonic findings outweigh common nonspecific ones), in the constellation as a whole, in prevalence for this patient group, in the time course, and in the specificity of any EEG or imaging pattern.";

const MEDICATION_REVIEW: &str = "\
### ⛔ CURRENT MEDICATION REVIEW (COMPLETE THIS BEFORE ANY NEW TREATMENT)
1. **STOP/HOLD CHECK**: for every medication the patient already takes, decide whether it is still safe given current labs (creatinine, GFR, liver enzymes, INR, electrolytes), still appropriate for the working diagnosis, and whether organ function calls for a dose change. Check every medication; typical examples include:
   * Metformin: stop if creatinine >1.5 (male) or >1.4 (female), with decompensated liver disease, or with lactic acidosis risk
   * NSAIDs: stop with AKI, CKD stage 3 or worse, GI bleeding, heart failure, or concurrent anticoagulation
   * ACE inhibitors/ARBs: hold if potassium >5.5 or creatinine is rising with AKI
   * Digoxin: hold if potassium <3.5 or creatinine is rising; check a level
   * Anticoagulants: hold if INR is supratherapeutic, with active bleeding, or platelets <50K
   * Statins: review if AST/ALT >3x ULN
   * Opioids: reduce in hepatic or renal impairment
   * Gabapentin/pregabalin: reduce for renal function
   ⚠️ Any current medication that must be stopped or adjusted goes PROMINENTLY AT THE TOP of the response.
2. **ALLERGY CHECK**: compare every proposed drug with the patient's allergies
3. **INTERACTION CHECK**: compare proposed drugs with the medications that remain
4. **CONTRAINDICATION CHECK**: compare against existing conditions and current labs
5. **RENAL DOSING**: adjust renally cleared drugs when creatinine is raised or GFR reduced
6. **HEPATIC DOSING**: adjust hepatically cleared drugs when liver enzymes or INR are raised or albumin is low
7. **AGE**: apply paediatric or geriatric adjustments

### DISEASE STAGING (where it applies)
- Compute the relevant severity scores (Child-Pugh, MELD, CURB-65, NYHA class, CKD stage and similar).
- Recommendations must fit the stage; never propose therapy indicated only for milder disease.
- If the disease is beyond curative treatment, say so plainly and recommend palliative or supportive care.

### Per diagnosis
#### Pharmacologic
- **First-line**: drug, exact dose, route, frequency, duration
- **Alternative**: when first-line is contraindicated, with the reason
- **Supportive**: symptom control
- **What to STOP**: current medications that are now unsafe
#### Non-pharmacologic
- Activity, diet and positioning changes; specialist referrals; patient education
#### Monitoring
- What to monitor and when, expected time to improvement, when to escalate
#### Red flags
- Symptoms that require immediate return, drug side effects to watch for, follow-up timing

⚠️ FLAG ANY CURRENT OR NEW DRUG THAT CONFLICTS WITH THE PATIENT'S ALLERGIES, LABS, MEDICATIONS OR CONDITIONS.
⚠️ IF A CURRENT MEDICATION MUST BE STOPPED, STATE IT IN BOLD AT THE VERY TOP.";

fn web_or_none(web_context: &str) -> &str {
    if web_context.trim().is_empty() {
        NO_WEB_CONTEXT
    } else {
        web_context
    }
}

/// Stage 1: triage plus ranked differential. The only stage that sees the
/// retrieved document and web context.
pub fn triage_differential(patient: &str, symptoms: &str, doc_context: &str, web_context: &str) -> String {
    format!(
        "You are an expert diagnostician with subspecialty training in neurology, immunology and critical care.
Using the patient profile, symptoms and reference material below, produce a triage assessment AND a differential diagnosis.

## PATIENT PROFILE
{patient}

## CURRENT SYMPTOMS
{symptoms}

## MEDICAL REFERENCE CONTEXT (clinical guidelines)
{doc_context}

## ADDITIONAL RESEARCH
{web}

---

## PART 1: TRIAGE
Determine:
1. Acuity (emergent, urgent or routine)
2. The organ system(s) most likely involved
3. Red flag findings present
4. The appropriate setting (ED, urgent care, outpatient or telemedicine)

Lead with safety-critical findings.

## PART 2: DIFFERENTIAL DIAGNOSIS

{REASONING_RULES}

Label Part 1 (Triage) and Part 2 (Differential) clearly in your response.",
        web = web_or_none(web_context),
    )
}

/// Stage 2: workup and treatment built on the stage-1 output only.
pub fn workup_treatment(patient: &str, differential: &str) -> String {
    format!(
        "You are a clinical decision support system and clinical pharmacologist focused on diagnostic workup and medication safety.
From the differential diagnosis below, recommend the best diagnostic workup AND a personalised treatment plan.

## PATIENT PROFILE
{patient}

## DIFFERENTIAL DIAGNOSIS (from the prior analysis)
{differential}

---

## PART 1: DIAGNOSTIC WORKUP
For each test give:
1. **Test** and what it evaluates
2. **Priority**: Immediate (minutes), Urgent (hours) or Routine (days)
3. **Expected findings** under each candidate diagnosis
4. **Value**: whether a cheaper test would answer the same question
5. **Patient factors**: contrast allergy, renal function, pregnancy and similar

Present a table grouped by priority, including point-of-care tests that can be done now.

## PART 2: TREATMENT PLAN

{MEDICATION_REVIEW}

Label Part 1 (Workup) and Part 2 (Treatment) clearly in your response."
    )
}

/// Stage 3: merge the earlier outputs into the final report.
pub fn assembly(patient: &str, triage_differential: &str, workup_treatment: &str) -> String {
    format!(
        "You are the senior attending physician writing the final diagnostic assessment.
Combine the analyses below into one coherent clinical report.

## PATIENT PROFILE
{patient}

## TRIAGE AND DIFFERENTIAL DIAGNOSIS
{triage_differential}

## WORKUP AND TREATMENT PLAN
{workup_treatment}

---

Write the report with exactly these sections:

## Differential Diagnosis
Ranked list with percentages and the evidence for and against each.

## Recommended Tests
Table: Test | Purpose | Priority | Expected Findings

## Treatment Plan
### For [Most Likely Diagnosis]:
- **Medications**: drug, dose, frequency and duration with patient-specific adjustments
- **Alternatives**: when first-line is contraindicated
- **Supportive Care**: non-drug measures
- **Follow-up**: timeline and monitoring
### For [Alternative Diagnosis]:
Same structure.

## ⚠️ Patient-Specific Considerations
- **Allergies**: what to avoid and why
- **Drug Interactions**: with current medications
- **Condition Adjustments**: how existing conditions change treatment
- **Seek Immediate Care If**: red flags specific to this patient

Formatting: clear headers, bold safety warnings, doses with units, and a note where a recommendation rests on clinical judgment rather than guidelines.
End with this disclaimer: {DISCLAIMER}

Write the complete assessment:"
    )
}

/// All inputs in one request; used when the multi-stage pipeline is disabled.
pub fn single_shot(patient: &str, symptoms: &str, doc_context: &str, web_context: &str) -> String {
    format!(
        "You are an expert medical diagnostic assistant. Assess the patient's symptoms thoroughly.

## PATIENT PROFILE
{patient}

## CURRENT SYMPTOMS
{symptoms}

## MEDICAL REFERENCE CONTEXT
{doc_context}

## ADDITIONAL RESEARCH
{web}

Provide a ranked differential diagnosis with percentages, a prioritised table of recommended tests,
a treatment plan personalised to this patient (checking allergies and interactions first), and patient-specific warnings.
Always include at least one dangerous diagnosis to rule out.
End with this disclaimer: {DISCLAIMER}",
        web = web_or_none(web_context),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_web_context_renders_none() {
        let p = triage_differential("P", "S", "D", "  ");
        assert!(p.contains("## ADDITIONAL RESEARCH\nNone\n"));
        let p = single_shot("P", "S", "D", "");
        assert!(p.contains("## ADDITIONAL RESEARCH\nNone\n"));
    }

    #[test]
    fn stage_two_carries_no_reference_slot() {
        let p = workup_treatment("P", "the differential");
        assert!(p.contains("the differential"));
        assert!(!p.contains("MEDICAL REFERENCE CONTEXT"));
        assert!(p.contains("STOP/HOLD CHECK"));
    }

    #[test]
    fn assembly_requires_sections_and_disclaimer() {
        let p = assembly("P", "T", "W");
        for section in ["## Differential Diagnosis", "## Recommended Tests", "## Treatment Plan", "Patient-Specific Considerations"] {
            assert!(p.contains(section), "missing {section}");
        }
        assert!(p.contains(DISCLAIMER));
    }
}
